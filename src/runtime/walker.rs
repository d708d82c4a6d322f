use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, debug_span, warn, Instrument};

use super::cancel::CancelHandle;
use super::executor::FlowExecutor;
use crate::config::EngineConfig;
use crate::error::{FlowEngineError, Result};
use crate::expression::{resolve, resolve_optional};
use crate::flow::Node;
use crate::runner::{NodeContext, RegionOutcome, SubFlowRun, Walker};
use crate::state::{ExecutionData, OverlayLookup, TriggerData};
use crate::trace::NodeTestConfig;

/// One finished node task.
struct NodeOutcome {
    row: Option<NodeTestConfig>,
    result: Result<Vec<String>>,
}

/// 单次运行的调度作用域
///
/// Cheap to clone; every spawned node task and every runner context holds
/// its own copy.
#[derive(Clone)]
pub(crate) struct RunScope {
    executor: FlowExecutor,
    data: Arc<ExecutionData>,
    cancel: CancelHandle,
    steps: Arc<AtomicUsize>,
}

impl RunScope {
    pub(crate) fn new(executor: FlowExecutor, data: Arc<ExecutionData>, cancel: CancelHandle) -> Self {
        Self {
            executor,
            data,
            cancel,
            steps: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Walks everything reachable from `entries`. Each node id runs at most
    /// once per call; siblings run concurrently up to `max_concurrency`.
    pub(crate) async fn walk(&self, entries: Vec<String>) -> RegionOutcome {
        let limit = self.executor.config().max_concurrency.max(1);
        let mut frontier: VecDeque<String> = entries.into();
        let mut visited = HashSet::new();
        let mut tasks: JoinSet<NodeOutcome> = JoinSet::new();
        let mut outcome = RegionOutcome::default();

        loop {
            if self.cancel.is_cancelled() {
                // Tasks that finished before the abort still report their rows,
                // matching the contexts they already saved.
                tasks.abort_all();
                while let Some(joined) = tasks.join_next().await {
                    if let Ok(done) = joined {
                        outcome.rows.extend(done.row);
                    }
                }
                outcome.cancelled = true;
                break;
            }

            while outcome.error.is_none() && tasks.len() < limit {
                let Some(node_id) = frontier.pop_front() else {
                    break;
                };
                if !visited.insert(node_id.clone()) {
                    continue;
                }
                if let Err(err) = self.claim_step() {
                    outcome.error = Some(err);
                    break;
                }
                let scope = self.clone();
                tasks.spawn(async move { scope.execute_node(node_id).await });
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => continue,
                Some(joined) = tasks.join_next() => match joined {
                    Ok(done) => {
                        outcome.rows.extend(done.row);
                        match done.result {
                            Ok(children) if outcome.error.is_none() => frontier.extend(children),
                            Ok(_) => {}
                            Err(err) => {
                                if outcome.error.is_none() {
                                    outcome.error = Some(err);
                                }
                            }
                        }
                    }
                    Err(join_error) => {
                        if outcome.error.is_none() {
                            outcome.error = Some(FlowEngineError::Other(join_error.into()));
                        }
                    }
                },
            }
        }
        outcome
    }

    fn claim_step(&self) -> Result<()> {
        let max = self.executor.config().max_steps;
        let taken = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if taken > max {
            warn!(execution_id = %self.data.execution_id(), max, "step budget exhausted");
            return Err(FlowEngineError::MaxStepsExceeded(max));
        }
        Ok(())
    }

    async fn execute_node(self, node_id: String) -> NodeOutcome {
        let Some(node) = self.data.flow().node(&node_id).cloned() else {
            return NodeOutcome {
                row: None,
                result: Err(FlowEngineError::UnknownNode(node_id)),
            };
        };
        let span = debug_span!("node", node = %node.node_id, node_type = %node.node_type);
        async move {
            let input = resolve_optional(node.input.as_ref(), self.data.as_ref());
            let row = NodeTestConfig::start(&node, input.defined_value());
            debug!("node started");

            let runner = match self.executor.registry().build(&node) {
                Ok(runner) => runner,
                Err(err) => return self.finish_failed(row, err),
            };
            let ctx = NodeContext::new(
                node.clone(),
                Arc::clone(&self.data),
                Arc::new(self.clone()),
            );
            let result = AssertUnwindSafe(runner.run(&ctx, input)).catch_unwind().await;
            let row = row.with_loop_results(ctx.take_iterations());

            match result {
                Ok(Ok(vertex)) => {
                    let output = self.apply_output_schema(&node, vertex.output);
                    self.data.save_node_context(&node.node_id, output.clone());
                    let row = row
                        .succeeded(output, vertex.children_ids.clone())
                        .with_debug_log(vertex.debug_log);
                    debug!(elapsed_ms = row.elapsed_ms, next = ?vertex.children_ids, "node finished");
                    self.emit(&row);
                    NodeOutcome {
                        row: Some(row),
                        result: Ok(vertex.children_ids),
                    }
                }
                Ok(Err(err)) => self.finish_failed(row, err),
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    self.finish_failed(
                        row,
                        FlowEngineError::runner(&node.node_id, format!("runner panicked: {message}")),
                    )
                }
            }
        }
        .instrument(span)
        .await
    }

    /// A declared output schema is resolved with the raw output visible under
    /// the node's own id; its result is what downstream nodes see.
    fn apply_output_schema(&self, node: &Node, raw: Value) -> Value {
        match &node.output {
            Some(schema) => {
                let overlay = OverlayLookup {
                    base: self.data.as_ref(),
                    node_id: &node.node_id,
                    output: &raw,
                };
                resolve(schema, &overlay).defined_value()
            }
            None => raw,
        }
    }

    fn finish_failed(&self, row: NodeTestConfig, err: FlowEngineError) -> NodeOutcome {
        let row = row.failed(err.to_string());
        warn!(error = %err, "node failed");
        self.emit(&row);
        NodeOutcome {
            row: Some(row),
            result: Err(err),
        }
    }

    fn emit(&self, row: &NodeTestConfig) {
        if let Some(sink) = self.executor.debug_sink() {
            sink.record(self.data.execution_id(), row);
        }
    }
}

#[async_trait]
impl Walker for RunScope {
    async fn walk_region(&self, entry: &str) -> RegionOutcome {
        self.walk(vec![entry.to_string()]).await
    }

    async fn run_sub_flow(
        &self,
        code: &str,
        version: Option<u32>,
        trigger: TriggerData,
    ) -> Result<SubFlowRun> {
        let depth = self.data.depth() + 1;
        let max_depth = self.executor.config().max_sub_flow_depth;
        if depth > max_depth {
            return Err(FlowEngineError::runner(
                code,
                format!("sub-flow nesting exceeds {max_depth} levels"),
            ));
        }
        let flows = self
            .executor
            .flow_repository()
            .ok_or_else(|| FlowEngineError::FlowNotFound {
                code: code.to_string(),
                version,
            })?;
        let flow = flows.load_flow(code, version).await?;
        if !flow.is_sub() {
            return Err(FlowEngineError::InvalidDefinition(format!(
                "flow `{code}` is not a sub-flow"
            )));
        }

        let execution = self
            .executor
            .execute(flow, trigger, depth, self.cancel.clone())
            .await?;
        Ok(SubFlowRun {
            execution_id: execution.execution_id,
            status: execution.status,
            output: execution.output,
            error: execution.error.map(|e| e.to_string()),
            rows: execution.trace.rows,
        })
    }

    fn config(&self) -> &EngineConfig {
        self.executor.config()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
