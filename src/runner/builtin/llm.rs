use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::expression::ResolvedInput;
use crate::flow::constants::node_types;
use crate::flow::Node;
use crate::llm::{DynLlmClient, LlmRequest};
use crate::runner::{parse_params, NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::Schema;

pub(super) fn manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::LLM)
        .description("Calls the configured language model")
        .params(Schema::object(
            [
                ("model", Schema::string().nullable()),
                ("temperature", Schema::number().nullable()),
            ],
            &[],
        ))
        .structured_input()
        .structured_output()
        .build()
}

#[derive(Deserialize)]
struct LlmParams {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
}

/// 大模型调用节点
pub struct LlmRunner {
    client: DynLlmClient,
    model: Option<String>,
    temperature: Option<f32>,
}

impl LlmRunner {
    pub fn from_node(node: &Node, client: DynLlmClient) -> Result<Self> {
        let params: LlmParams = parse_params(node)?;
        Ok(Self {
            client,
            model: params.model,
            temperature: params.temperature,
        })
    }
}

#[async_trait]
impl NodeRunner for LlmRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        let user = input.require_str(ctx.node_id(), "user_prompt")?;
        let mut request = LlmRequest::new(user);
        if let Some(system) = input.get_str("system_prompt") {
            request = request.with_system(system);
        }
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        debug!(node = %ctx.node_id(), model = ?request.model, "calling llm");
        let response = self
            .client
            .complete(request)
            .await
            .map_err(|e| ctx.fail(format!("llm call failed: {e}")))?;

        let output = json!({
            "response": response.content,
            "model": response.model,
        });
        Ok(VertexResult::next(ctx.node(), output).with_debug_log(response.transcript))
    }
}
