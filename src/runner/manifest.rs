use serde::{Deserialize, Serialize};

use crate::flow::constants::versions;
use crate::schema::Schema;

/// 节点执行器描述（供编辑器使用，调度器不读取）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunnerManifest {
    pub node_type: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub params: Schema,
    #[serde(default)]
    pub needs_structured_input: bool,
    #[serde(default)]
    pub needs_structured_output: bool,
    #[serde(default)]
    pub supports_debug: bool,
}

impl RunnerManifest {
    pub fn builder(node_type: impl Into<String>) -> RunnerManifestBuilder {
        RunnerManifestBuilder::new(node_type)
    }
}

#[derive(Clone, Debug)]
pub struct RunnerManifestBuilder {
    manifest: RunnerManifest,
}

impl RunnerManifestBuilder {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            manifest: RunnerManifest {
                node_type: node_type.into(),
                version: versions::DEFAULT.to_string(),
                description: None,
                params: Schema::any(),
                needs_structured_input: false,
                needs_structured_output: false,
                supports_debug: true,
            },
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.manifest.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.manifest.description = Some(description.into());
        self
    }

    pub fn params(mut self, schema: Schema) -> Self {
        self.manifest.params = schema;
        self
    }

    pub fn structured_input(mut self) -> Self {
        self.manifest.needs_structured_input = true;
        self
    }

    pub fn structured_output(mut self) -> Self {
        self.manifest.needs_structured_output = true;
        self
    }

    pub fn without_debug(mut self) -> Self {
        self.manifest.supports_debug = false;
        self
    }

    pub fn build(self) -> RunnerManifest {
        self.manifest
    }
}
