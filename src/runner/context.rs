use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{FlowEngineError, Result};
use crate::expression::ResolvedInput;
use crate::flow::{Flow, Node};
use crate::state::{ExecutionData, TriggerData};
use crate::trace::{LoopIterationResult, NodeTestConfig, RunStatus};

/// 节点执行结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexResult {
    pub output: Value,
    /// Nodes to schedule next; empty ends this branch.
    pub children_ids: Vec<String>,
    pub debug_log: Option<Value>,
}

impl VertexResult {
    pub fn new(output: Value, children_ids: Vec<String>) -> Self {
        Self {
            output,
            children_ids,
            debug_log: None,
        }
    }

    /// Continues down the node's static `next_nodes`.
    pub fn next(node: &Node, output: Value) -> Self {
        Self::new(output, node.next_nodes.clone())
    }

    pub fn terminal(output: Value) -> Self {
        Self::new(output, Vec::new())
    }

    pub fn with_debug_log(mut self, debug_log: Option<Value>) -> Self {
        self.debug_log = debug_log;
        self
    }
}

/// 子区域（循环体）一次遍历的结果
#[derive(Debug, Default)]
pub struct RegionOutcome {
    pub rows: Vec<NodeTestConfig>,
    pub error: Option<FlowEngineError>,
    pub cancelled: bool,
}

impl RegionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }
}

/// 子流程运行摘要
#[derive(Clone, Debug)]
pub struct SubFlowRun {
    pub execution_id: String,
    pub status: RunStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub rows: Vec<NodeTestConfig>,
}

/// Scheduler services a runner can call back into.
#[async_trait]
pub trait Walker: Send + Sync {
    /// Walks the nodes reachable from `entry` with a fresh visited set.
    async fn walk_region(&self, entry: &str) -> RegionOutcome;

    /// Runs a published sub-flow with its own isolated execution data.
    async fn run_sub_flow(
        &self,
        code: &str,
        version: Option<u32>,
        trigger: TriggerData,
    ) -> Result<SubFlowRun>;

    fn config(&self) -> &EngineConfig;

    fn is_cancelled(&self) -> bool;
}

/// 节点执行时可见的上下文
pub struct NodeContext {
    node: Node,
    data: Arc<ExecutionData>,
    walker: Arc<dyn Walker>,
    iterations: Mutex<Vec<LoopIterationResult>>,
}

impl NodeContext {
    pub fn new(node: Node, data: Arc<ExecutionData>, walker: Arc<dyn Walker>) -> Self {
        Self {
            node,
            data,
            walker,
            iterations: Mutex::new(Vec::new()),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn node_id(&self) -> &str {
        &self.node.node_id
    }

    pub fn data(&self) -> &ExecutionData {
        &self.data
    }

    pub fn flow(&self) -> &Arc<Flow> {
        self.data.flow()
    }

    pub fn walker(&self) -> &dyn Walker {
        self.walker.as_ref()
    }

    /// Recorded as they finish so a failing loop still reports earlier iterations.
    pub fn record_iteration(&self, result: LoopIterationResult) {
        self.iterations.lock().push(result);
    }

    pub fn take_iterations(&self) -> Vec<LoopIterationResult> {
        std::mem::take(&mut *self.iterations.lock())
    }

    pub fn fail(&self, message: impl Into<String>) -> FlowEngineError {
        FlowEngineError::runner(&self.node.node_id, message)
    }
}

/// 节点执行器
#[async_trait]
pub trait NodeRunner: Send + Sync {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult>;

    /// Publish-time checks that need the surrounding flow.
    fn validate(&self, _flow: &Flow, _node: &Node) -> Result<()> {
        Ok(())
    }
}
