use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{FlowEngineError, Result};
use crate::expression::ResolvedInput;
use crate::flow::conditions::Condition;
use crate::flow::constants::node_types;
use crate::flow::validation::check_references;
use crate::flow::{Flow, Node};
use crate::runner::{parse_params, NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::Schema;
use crate::trace::LoopIterationResult;

pub(super) fn manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::LOOP)
        .description("Runs its body region once per iteration")
        .params(Schema::object(
            [
                ("mode", Schema::one_of(["count", "array", "condition"]).nullable()),
                ("count", Schema::integer().nullable()),
                ("condition", Schema::any().nullable()),
                ("max_iterations", Schema::integer().nullable()),
                ("body", Schema::string()),
            ],
            &["body"],
        ))
        .structured_input()
        .build()
}

pub(super) fn body_manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::LOOP_BODY)
        .description("Head of a loop body; exposes the current index and item")
        .params(Schema::empty_object())
        .build()
}

pub(super) fn end_manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::LOOP_END)
        .description("Ends the current iteration's branch")
        .params(Schema::empty_object())
        .build()
}

/// 循环方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    Count,
    Array,
    Condition,
}

#[derive(Deserialize)]
struct LoopParams {
    #[serde(default)]
    mode: Option<LoopMode>,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    condition: Option<Condition>,
    #[serde(default)]
    max_iterations: Option<usize>,
    body: String,
}

/// Iterations of a count or array loop, checked against the limit before any run.
enum LoopPlan {
    Count(u64),
    Items(Vec<Value>),
}

impl LoopPlan {
    fn len(&self) -> u64 {
        match self {
            LoopPlan::Count(count) => *count,
            LoopPlan::Items(items) => items.len() as u64,
        }
    }

    fn item(&self, index: usize) -> Value {
        match self {
            LoopPlan::Count(_) => json!(index),
            LoopPlan::Items(items) => items.get(index).cloned().unwrap_or(Value::Null),
        }
    }
}

/// 循环节点
///
/// Before each iteration the loop's own saved context is replaced with
/// `{index, item, count}` so body expressions can read `{{loop.item}}`. Body
/// nodes overwrite their previous iteration's output.
pub struct LoopRunner {
    mode: LoopMode,
    count: Option<u64>,
    condition: Option<Condition>,
    max_iterations: Option<usize>,
    body: String,
}

impl LoopRunner {
    pub fn from_node(node: &Node) -> Result<Self> {
        let params: LoopParams = parse_params(node)?;
        Ok(Self {
            mode: params.mode.unwrap_or_default(),
            count: params.count,
            condition: params.condition,
            max_iterations: params.max_iterations,
            body: params.body,
        })
    }

    /// Works out how many iterations to run without materialising them.
    fn plan(&self, ctx: &NodeContext, input: &ResolvedInput) -> Result<LoopPlan> {
        match self.mode {
            LoopMode::Count => {
                let count = match input.get("count") {
                    Some(value) => value
                        .as_u64()
                        .ok_or_else(|| ctx.fail("loop input `count` must be a non-negative integer"))?,
                    None => self
                        .count
                        .ok_or_else(|| ctx.fail("count loop needs a `count`"))?,
                };
                Ok(LoopPlan::Count(count))
            }
            LoopMode::Array => {
                let items = input.require(ctx.node_id(), "items")?;
                items
                    .as_array()
                    .cloned()
                    .map(LoopPlan::Items)
                    .ok_or_else(|| ctx.fail("loop input `items` must be an array"))
            }
            LoopMode::Condition => Ok(LoopPlan::Items(Vec::new())),
        }
    }

    async fn iterate(&self, ctx: &NodeContext, index: usize, item: &Value, count: Value) -> Result<()> {
        ctx.data().save_node_context(
            ctx.node_id(),
            json!({"index": index, "item": item, "count": count}),
        );

        let started = Instant::now();
        let outcome = ctx.walker().walk_region(&self.body).await;
        let success = outcome.is_success();
        let error_message = match (&outcome.error, outcome.cancelled) {
            (Some(err), _) => Some(err.to_string()),
            (None, true) => Some(FlowEngineError::Cancelled.to_string()),
            (None, false) => None,
        };
        ctx.record_iteration(LoopIterationResult {
            index,
            success,
            elapsed_ms: started.elapsed().as_millis() as u64,
            rows: outcome.rows,
            error_message,
        });

        if outcome.cancelled {
            return Err(FlowEngineError::Cancelled);
        }
        if let Some(err) = outcome.error {
            return Err(ctx.fail(format!("iteration {index} failed: {err}")));
        }
        debug!(node = %ctx.node_id(), index, "loop iteration finished");
        Ok(())
    }

    /// Static successors minus anything inside the body region.
    fn after_loop(&self, flow: &Flow, node: &Node) -> Vec<String> {
        node.next_nodes
            .iter()
            .filter(|id| {
                *id != &self.body
                    && flow
                        .node(id)
                        .map_or(true, |next| next.parent_id.as_deref() != Some(node.node_id.as_str()))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NodeRunner for LoopRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        let max = self
            .max_iterations
            .unwrap_or(ctx.walker().config().default_loop_max_iterations);
        let mut seen = Vec::new();

        if self.mode == LoopMode::Condition {
            let condition = self
                .condition
                .as_ref()
                .ok_or_else(|| ctx.fail("condition loop needs a `condition`"))?;
            let mut index = 0;
            loop {
                ctx.data().save_node_context(
                    ctx.node_id(),
                    json!({"index": index, "item": index, "count": Value::Null}),
                );
                if !condition.evaluate(ctx.data()) {
                    break;
                }
                if index >= max {
                    return Err(ctx.fail(format!("loop exceeded max_iterations ({max})")));
                }
                let item = json!(index);
                self.iterate(ctx, index, &item, Value::Null).await?;
                seen.push(item);
                index += 1;
            }
        } else {
            let plan = self.plan(ctx, &input)?;
            let total = plan.len();
            if total > max as u64 {
                return Err(ctx.fail(format!(
                    "loop of {total} iterations exceeds max_iterations ({max})"
                )));
            }
            let count = json!(total);
            for index in 0..total as usize {
                if ctx.walker().is_cancelled() {
                    return Err(FlowEngineError::Cancelled);
                }
                let item = plan.item(index);
                self.iterate(ctx, index, &item, count.clone()).await?;
                seen.push(item);
            }
        }

        let output = json!({ "count": seen.len(), "items": seen });
        Ok(VertexResult::new(output, self.after_loop(ctx.flow(), ctx.node())))
    }

    fn validate(&self, flow: &Flow, node: &Node) -> Result<()> {
        let body = flow.node(&self.body).ok_or_else(|| {
            FlowEngineError::InvalidDefinition(format!(
                "loop `{}` body `{}` is not a node",
                node.node_id, self.body
            ))
        })?;
        if !body.is_type(node_types::LOOP_BODY) {
            return Err(FlowEngineError::InvalidDefinition(format!(
                "loop `{}` body `{}` must be a `{}` node",
                node.node_id,
                self.body,
                node_types::LOOP_BODY
            )));
        }
        if body.parent_id.as_deref() != Some(node.node_id.as_str()) {
            return Err(FlowEngineError::InvalidDefinition(format!(
                "loop body `{}` must be nested in `{}`",
                self.body, node.node_id
            )));
        }
        match (self.mode, &self.condition) {
            (LoopMode::Condition, None) => Err(FlowEngineError::InvalidDefinition(format!(
                "condition loop `{}` has no condition",
                node.node_id
            ))),
            (_, Some(condition)) => condition
                .schemas()
                .into_iter()
                .try_for_each(|schema| check_references(flow, &node.node_id, schema)),
            _ => Ok(()),
        }
    }
}

/// 循环体入口标记
pub struct LoopBodyRunner;

#[async_trait]
impl NodeRunner for LoopBodyRunner {
    async fn run(&self, ctx: &NodeContext, _input: ResolvedInput) -> Result<VertexResult> {
        let parent = ctx
            .node()
            .parent_id
            .as_deref()
            .ok_or_else(|| ctx.fail("loop body has no enclosing loop"))?;
        let view = ctx
            .data()
            .node_context(parent)
            .ok_or_else(|| ctx.fail(format!("loop `{parent}` has not started")))?;
        let output = json!({
            "index": view.get("index").cloned().unwrap_or(Value::Null),
            "item": view.get("item").cloned().unwrap_or(Value::Null),
        });
        Ok(VertexResult::next(ctx.node(), output))
    }
}

/// 单次迭代的结束标记
pub struct LoopEndRunner;

#[async_trait]
impl NodeRunner for LoopEndRunner {
    async fn run(&self, _ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        Ok(VertexResult::terminal(input.defined_value()))
    }
}
