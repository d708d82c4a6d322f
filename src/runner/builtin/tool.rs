use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{FlowEngineError, Result};
use crate::expression::ResolvedInput;
use crate::flow::constants::node_types;
use crate::flow::{Flow, Node};
use crate::runner::{parse_params, NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::{validate, Schema};
use crate::tools::{ToolInvocation, ToolRegistry};

pub(super) fn manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::TOOL)
        .description("Invokes a registered tool with the node input as arguments")
        .params(Schema::object([("tool", Schema::string())], &["tool"]))
        .structured_input()
        .build()
}

#[derive(Deserialize)]
struct ToolParams {
    tool: String,
}

/// 工具调用节点
pub struct ToolRunner {
    tools: Arc<ToolRegistry>,
    tool: String,
}

impl ToolRunner {
    pub fn from_node(node: &Node, tools: Arc<ToolRegistry>) -> Result<Self> {
        let params: ToolParams = parse_params(node)?;
        Ok(Self {
            tools,
            tool: params.tool,
        })
    }
}

#[async_trait]
impl NodeRunner for ToolRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        let tool = self
            .tools
            .get(&self.tool)
            .ok_or_else(|| ctx.fail(format!("tool `{}` is not registered", self.tool)))?;
        let arguments = input.defined_value();

        if let Some(schema) = self.tools.manifest(&self.tool).and_then(|m| m.input.clone()) {
            validate(&schema, &arguments)
                .map_err(|e| ctx.fail(format!("arguments for `{}`: {e}", self.tool)))?;
        }

        let invocation =
            ToolInvocation::new(self.tool.clone(), arguments).with_execution(ctx.data().execution_id());
        let output = tool
            .call(invocation)
            .await
            .map_err(|e| ctx.fail(format!("tool `{}` failed: {e}", self.tool)))?;

        Ok(VertexResult::next(ctx.node(), output.result).with_debug_log(output.transcript))
    }

    fn validate(&self, _flow: &Flow, node: &Node) -> Result<()> {
        if self.tools.contains(&self.tool) {
            Ok(())
        } else {
            Err(FlowEngineError::InvalidDefinition(format!(
                "node `{}` uses unregistered tool `{}`",
                node.node_id, self.tool
            )))
        }
    }
}
