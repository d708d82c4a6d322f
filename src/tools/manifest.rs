use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// 工具描述：名称、说明与入参 / 出参 Schema
///
/// `input`, when present, is enforced by the tool runner before every call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Schema>,
}

impl ToolManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input: None,
            output: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input(mut self, schema: Schema) -> Self {
        self.input = Some(schema);
        self
    }

    pub fn with_output(mut self, schema: Schema) -> Self {
        self.output = Some(schema);
        self
    }
}
