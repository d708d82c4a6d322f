use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{FlowEngineError, Result};
use crate::tools::manifest::ToolManifest;
use crate::tools::tool::Tool;

/// 工具注册表，按名称查找
///
/// Tools registered without a manifest get a bare one carrying only the
/// name, so `manifest` answers for every registered tool.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, (Arc<dyn Tool>, Arc<ToolManifest>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let manifest = ToolManifest::new(tool.name());
        self.insert(tool, manifest);
    }

    /// Fails when the manifest describes a different tool.
    pub fn register_with_manifest(&mut self, tool: Arc<dyn Tool>, manifest: ToolManifest) -> Result<()> {
        if manifest.name != tool.name() {
            return Err(FlowEngineError::Config(format!(
                "manifest `{}` cannot describe tool `{}`",
                manifest.name,
                tool.name()
            )));
        }
        self.insert(tool, manifest);
        Ok(())
    }

    fn insert(&mut self, tool: Arc<dyn Tool>, manifest: ToolManifest) {
        debug!(tool = %manifest.name, "registering tool");
        self.tools
            .insert(manifest.name.clone(), (tool, Arc::new(manifest)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|(tool, _)| Arc::clone(tool))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn manifest(&self, name: &str) -> Option<Arc<ToolManifest>> {
        self.tools.get(name).map(|(_, manifest)| Arc::clone(manifest))
    }

    /// Sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }
}
