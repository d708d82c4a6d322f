use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tracing::warn;

use super::trigger::TriggerData;
use crate::expression::{lookup_path, ContextLookup};
use crate::flow::constants::sources;
use crate::flow::Flow;

/// 单次运行的上下文
///
/// Holds everything one run accumulates: per-node saved outputs, run
/// variables, trigger data and the dynamically discovered end node. It is
/// passed explicitly through the call chain and never shared between runs.
pub struct ExecutionData {
    execution_id: String,
    organization_code: String,
    flow: Arc<Flow>,
    trigger: TriggerData,
    node_contexts: RwLock<HashMap<String, Value>>,
    variables: RwLock<Map<String, Value>>,
    end_node: Mutex<Option<String>>,
    depth: usize,
}

impl ExecutionData {
    pub fn new(flow: Arc<Flow>, trigger: TriggerData) -> Self {
        Self::with_depth(flow, trigger, 0)
    }

    pub(crate) fn with_depth(flow: Arc<Flow>, trigger: TriggerData, depth: usize) -> Self {
        let organization_code = trigger
            .organization_code
            .clone()
            .or_else(|| flow.organization_code.clone())
            .unwrap_or_default();
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            organization_code,
            flow,
            trigger,
            node_contexts: RwLock::new(HashMap::new()),
            variables: RwLock::new(Map::new()),
            end_node: Mutex::new(None),
            depth,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn organization_code(&self) -> &str {
        &self.organization_code
    }

    pub fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }

    pub fn trigger(&self) -> &TriggerData {
        &self.trigger
    }

    /// Sub-flow nesting depth; 0 for a top-level run.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn save_node_context(&self, node_id: &str, output: Value) {
        self.node_contexts.write().insert(node_id.to_string(), output);
    }

    pub fn node_context(&self, node_id: &str) -> Option<Value> {
        self.node_contexts.read().get(node_id).cloned()
    }

    pub fn has_node_context(&self, node_id: &str) -> bool {
        self.node_contexts.read().contains_key(node_id)
    }

    pub fn node_contexts(&self) -> BTreeMap<String, Value> {
        self.node_contexts
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.variables.write().insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.read().get(name).cloned()
    }

    pub fn variables(&self) -> Map<String, Value> {
        self.variables.read().clone()
    }

    /// Records the End node that terminated the run. The first End to execute
    /// wins; later ones are logged and ignored.
    pub fn mark_end_node(&self, node_id: &str) -> bool {
        let mut end = self.end_node.lock();
        match end.as_deref() {
            None => {
                *end = Some(node_id.to_string());
                true
            }
            Some(existing) if existing == node_id => true,
            Some(existing) => {
                warn!(
                    execution_id = %self.execution_id,
                    first = %existing,
                    ignored = %node_id,
                    "multiple end nodes reached; keeping the first"
                );
                false
            }
        }
    }

    pub fn end_node(&self) -> Option<String> {
        self.end_node.lock().clone()
    }

    /// The end node's saved output, which is the run's result.
    pub fn output(&self) -> Option<Value> {
        self.end_node().and_then(|id| self.node_context(&id))
    }

    fn trigger_view(&self) -> Value {
        json!({
            "trigger_type": self.trigger.trigger_type,
            "payload": self.trigger.payload,
            "user_id": self.trigger.user_id,
            "organization_code": self.organization_code,
            "metadata": self.trigger.metadata,
        })
    }
}

impl ContextLookup for ExecutionData {
    fn lookup(&self, node_id: &str, path: &str) -> Option<Value> {
        match node_id {
            sources::VARIABLES => {
                let variables = self.variables.read();
                let (name, rest) = path.split_once('.').unwrap_or((path, ""));
                if name.is_empty() {
                    return Some(Value::Object(variables.clone()));
                }
                variables
                    .get(name)
                    .and_then(|value| lookup_path(value, rest))
                    .cloned()
            }
            sources::TRIGGER => lookup_path(&self.trigger_view(), path).cloned(),
            _ => self
                .node_contexts
                .read()
                .get(node_id)
                .and_then(|output| lookup_path(output, path))
                .cloned(),
        }
    }
}

/// 在运行上下文之上叠加一个节点的原始输出（用于输出 Schema 求值）
pub(crate) struct OverlayLookup<'a> {
    pub base: &'a ExecutionData,
    pub node_id: &'a str,
    pub output: &'a Value,
}

impl ContextLookup for OverlayLookup<'_> {
    fn lookup(&self, node_id: &str, path: &str) -> Option<Value> {
        if node_id == self.node_id {
            return lookup_path(self.output, path).cloned();
        }
        self.base.lookup(node_id, path)
    }
}
