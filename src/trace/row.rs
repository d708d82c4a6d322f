use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flow::Node;

/// 单个节点执行的调试记录
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeTestConfig {
    pub node_id: String,
    pub node_type: String,
    pub node_version: String,
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_log: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loop_debug_results: Vec<LoopIterationResult>,
}

impl NodeTestConfig {
    /// Opens a row for `node`; finish it with [`succeeded`](Self::succeeded) or
    /// [`failed`](Self::failed).
    pub fn start(node: &Node, input: Value) -> Self {
        let now = Utc::now();
        Self {
            node_id: node.node_id.clone(),
            node_type: node.node_type.clone(),
            node_version: node.node_version.clone(),
            success: false,
            start_time: now,
            end_time: now,
            elapsed_ms: 0,
            input,
            output: Value::Null,
            error_message: None,
            children_ids: Vec::new(),
            debug_log: None,
            loop_debug_results: Vec::new(),
        }
    }

    pub fn succeeded(mut self, output: Value, children_ids: Vec<String>) -> Self {
        self.success = true;
        self.output = output;
        self.children_ids = children_ids;
        self.finish()
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(message.into());
        self.finish()
    }

    pub fn with_debug_log(mut self, debug_log: Option<Value>) -> Self {
        self.debug_log = debug_log;
        self
    }

    pub fn with_loop_results(mut self, results: Vec<LoopIterationResult>) -> Self {
        self.loop_debug_results = results;
        self
    }

    fn finish(mut self) -> Self {
        self.end_time = Utc::now();
        self.elapsed_ms = (self.end_time - self.start_time)
            .num_milliseconds()
            .max(0) as u64;
        self
    }
}

/// 循环单次迭代的结果
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoopIterationResult {
    pub index: usize,
    pub success: bool,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub rows: Vec<NodeTestConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
