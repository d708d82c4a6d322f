use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{FlowEngineError, Result};
use crate::expression::{lookup_path, ResolvedInput};
use crate::flow::constants::node_types;
use crate::flow::Node;
use crate::runner::{parse_params, NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::Schema;

pub(super) fn manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::START)
        .description("Entry point; exposes the trigger payload")
        .params(Schema::object(
            [("required", Schema::array(Schema::string()).nullable())],
            &[],
        ))
        .structured_output()
        .build()
}

#[derive(Deserialize)]
struct StartParams {
    #[serde(default)]
    required: Option<Vec<String>>,
}

/// 开始节点
pub struct StartRunner {
    required: Vec<String>,
}

impl StartRunner {
    pub fn from_node(node: &Node) -> Result<Self> {
        let params: StartParams = parse_params(node)?;
        Ok(Self {
            required: params.required.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl NodeRunner for StartRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        let mut output = ctx.data().trigger().payload.clone();

        // Declared input fields act as defaults for keys the trigger left out.
        if let (Value::Object(payload), Value::Object(defaults)) =
            (&mut output, input.defined_value())
        {
            for (key, value) in defaults {
                payload.entry(key).or_insert(value);
            }
        }

        for field in &self.required {
            if lookup_path(&output, field).map_or(true, Value::is_null) {
                return Err(FlowEngineError::MissingInput {
                    node: ctx.node_id().to_string(),
                    field: field.clone(),
                });
            }
        }

        Ok(VertexResult::next(ctx.node(), output))
    }
}
