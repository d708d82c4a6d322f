use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::expression::ResolvedInput;
use crate::flow::constants::node_types;
use crate::message::{DynMessageStore, MessageQuery};
use crate::runner::{NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::Schema;

pub(super) fn manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::MESSAGE_SEARCH)
        .description("Searches conversation history")
        .params(Schema::empty_object())
        .structured_input()
        .structured_output()
        .build()
}

/// 历史消息检索节点
pub struct MessageSearchRunner {
    store: Option<DynMessageStore>,
}

impl MessageSearchRunner {
    pub fn new(store: Option<DynMessageStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NodeRunner for MessageSearchRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| ctx.fail("no message store configured"))?;
        let query = MessageQuery {
            conversation_id: input.get_str("conversation_id").map(str::to_string),
            keyword: input
                .get_str("keyword")
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            limit: input
                .get("limit")
                .and_then(|v| v.as_u64())
                .map_or(MessageQuery::default_limit(), |limit| limit as usize),
        };
        let messages = store
            .search(&query)
            .await
            .map_err(|e| ctx.fail(format!("message search failed: {e}")))?;
        Ok(VertexResult::next(ctx.node(), json!({ "messages": messages })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::flow::{FlowBuilder, Node};
    use crate::message::{MemoryMessageStore, StoredMessage};
    use crate::runner::builtin::testing::context;
    use crate::state::TriggerData;

    #[tokio::test]
    async fn default_limit_and_keyword() {
        let store = MemoryMessageStore::new();
        for i in 0..12 {
            store.append(StoredMessage::new("c", "user", format!("note {i}")));
        }
        store.append(StoredMessage::new("c", "user", "refund please"));
        let flow = FlowBuilder::new("m")
            .start("start")
            .node(Node::new("find", node_types::MESSAGE_SEARCH))
            .connect("start", "find")
            .build()
            .unwrap();
        let ctx = context(flow, "find", TriggerData::manual(json!({})));
        let runner = MessageSearchRunner::new(Some(Arc::new(store)));

        let all = runner.run(&ctx, ResolvedInput::empty()).await.unwrap();
        assert_eq!(all.output["messages"].as_array().unwrap().len(), 10);

        let refund = runner
            .run(&ctx, ResolvedInput::from_value(json!({"keyword": "refund"})))
            .await
            .unwrap();
        assert_eq!(refund.output["messages"][0]["content"], json!("refund please"));
    }
}
