use async_trait::async_trait;

use crate::error::Result;
use crate::expression::ResolvedInput;
use crate::flow::constants::node_types;
use crate::runner::{NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::Schema;

pub(super) fn manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::END)
        .description("Terminates its branch; its input is the flow result")
        .params(Schema::empty_object())
        .structured_input()
        .build()
}

/// 结束节点
pub struct EndRunner;

#[async_trait]
impl NodeRunner for EndRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        ctx.data().mark_end_node(ctx.node_id());
        Ok(VertexResult::terminal(input.defined_value()))
    }
}
