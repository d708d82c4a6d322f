use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::context::NodeRunner;
use super::manifest::RunnerManifest;
use crate::error::{FlowEngineError, Result};
use crate::flow::Node;
use crate::http::DynHttpClient;
use crate::llm::{DynLlmClient, LocalEchoClient};
use crate::message::DynMessageStore;
use crate::schema::validate;
use crate::tools::ToolRegistry;

/// Builds a runner for one node from its `params`.
pub type RunnerFactory = Arc<dyn Fn(&Node) -> Result<Arc<dyn NodeRunner>> + Send + Sync>;

#[derive(Clone)]
struct RunnerEntry {
    manifest: Arc<RunnerManifest>,
    factory: RunnerFactory,
}

/// 节点执行器注册表，按 (type, version) 精确匹配
#[derive(Default, Clone)]
pub struct RunnerRegistry {
    entries: HashMap<(String, String), RunnerEntry>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry with every built-in runner under `v0`.
    pub fn with_builtins(services: RunnerServices) -> Self {
        let mut registry = Self::new();
        super::builtin::register_builtins(&mut registry, &services);
        registry
    }

    /// Registers (or replaces) the runner for the manifest's `(type, version)`.
    pub fn register(&mut self, manifest: RunnerManifest, factory: RunnerFactory) {
        let key = (manifest.node_type.clone(), manifest.version.clone());
        debug!(node_type = %key.0, version = %key.1, "registering runner");
        self.entries.insert(
            key,
            RunnerEntry {
                manifest: Arc::new(manifest),
                factory,
            },
        );
    }

    pub fn resolve(&self, node_type: &str, version: &str) -> Result<RunnerFactory> {
        self.entry(node_type, version)
            .map(|entry| Arc::clone(&entry.factory))
    }

    pub fn manifest(&self, node_type: &str, version: &str) -> Option<Arc<RunnerManifest>> {
        self.entry(node_type, version)
            .ok()
            .map(|entry| Arc::clone(&entry.manifest))
    }

    pub fn contains(&self, node_type: &str, version: &str) -> bool {
        self.entries
            .contains_key(&(node_type.to_string(), version.to_string()))
    }

    /// Sorted by type, then version.
    pub fn manifests(&self) -> Vec<Arc<RunnerManifest>> {
        let mut manifests: Vec<_> = self
            .entries
            .values()
            .map(|entry| Arc::clone(&entry.manifest))
            .collect();
        manifests.sort_by(|a, b| (&a.node_type, &a.version).cmp(&(&b.node_type, &b.version)));
        manifests
    }

    /// Instantiates the runner bound to `node`.
    pub fn build(&self, node: &Node) -> Result<Arc<dyn NodeRunner>> {
        let factory = self.resolve(&node.node_type, &node.node_version)?;
        factory(node)
    }

    /// Checks `params` against the runner's schema, then builds the runner.
    pub fn build_checked(&self, node: &Node) -> Result<Arc<dyn NodeRunner>> {
        let entry = self.entry(&node.node_type, &node.node_version)?;
        validate(&entry.manifest.params, &node.params).map_err(|e| {
            FlowEngineError::InvalidDefinition(format!("node `{}` params: {e}", node.node_id))
        })?;
        (entry.factory)(node)
    }

    fn entry(&self, node_type: &str, version: &str) -> Result<&RunnerEntry> {
        self.entries
            .get(&(node_type.to_string(), version.to_string()))
            .ok_or_else(|| FlowEngineError::RunnerNotRegistered {
                node_type: node_type.to_string(),
                version: version.to_string(),
            })
    }
}

/// 内置执行器依赖的外部服务
#[derive(Clone)]
pub struct RunnerServices {
    pub llm: DynLlmClient,
    pub http: Option<DynHttpClient>,
    pub tools: Arc<ToolRegistry>,
    pub messages: Option<DynMessageStore>,
}

impl RunnerServices {
    pub fn with_llm(mut self, llm: DynLlmClient) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_http(mut self, http: DynHttpClient) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_messages(mut self, messages: DynMessageStore) -> Self {
        self.messages = Some(messages);
        self
    }
}

impl Default for RunnerServices {
    fn default() -> Self {
        #[cfg(feature = "http-client")]
        let http: Option<DynHttpClient> = Some(Arc::new(crate::http::ReqwestHttpClient::new()));
        #[cfg(not(feature = "http-client"))]
        let http: Option<DynHttpClient> = None;

        Self {
            llm: Arc::new(LocalEchoClient),
            http,
            tools: Arc::new(ToolRegistry::new()),
            messages: None,
        }
    }
}
