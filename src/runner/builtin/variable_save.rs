use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::expression::ResolvedInput;
use crate::flow::constants::node_types;
use crate::runner::{NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::Schema;

pub(super) fn manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::VARIABLE_SAVE)
        .description("Writes run variables readable as {{variables.name}}")
        .params(Schema::empty_object())
        .structured_input()
        .build()
}

/// 变量保存节点
pub struct VariableSaveRunner;

#[async_trait]
impl NodeRunner for VariableSaveRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        input.require(ctx.node_id(), "variables")?;
        let variables = match input.defined_value() {
            Value::Object(mut fields) => fields.remove("variables"),
            _ => None,
        };
        let Some(Value::Object(variables)) = variables else {
            return Err(ctx.fail("input `variables` must be an object"));
        };
        for (name, value) in &variables {
            ctx.data().set_variable(name.clone(), value.clone());
        }
        Ok(VertexResult::next(ctx.node(), Value::Object(variables)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{resolve, ContextLookup, ValueSchema};
    use crate::flow::{FlowBuilder, Node};
    use crate::runner::builtin::testing::context;
    use crate::state::TriggerData;
    use serde_json::json;

    #[tokio::test]
    async fn saves_only_defined_variables() {
        let flow = FlowBuilder::new("v")
            .start("start")
            .node(Node::new("save", node_types::VARIABLE_SAVE))
            .connect("start", "save")
            .build()
            .unwrap();
        let ctx = context(flow, "save", TriggerData::manual(json!({"city": "Oslo"})));
        let input = resolve(
            &ValueSchema::object([(
                "variables",
                ValueSchema::object([
                    ("city", ValueSchema::reference("trigger", "payload.city")),
                    ("later", ValueSchema::reference("ghost", "x")),
                ]),
            )]),
            ctx.data(),
        );
        let result = VariableSaveRunner.run(&ctx, input).await.unwrap();
        assert_eq!(result.output, json!({"city": "Oslo"}));
        assert_eq!(ctx.data().lookup("variables", "city"), Some(json!("Oslo")));
        assert!(ctx.data().variable("later").is_none());
    }
}
