use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use super::client::LlmClient;
use super::types::{LlmRequest, LlmResponse};
use crate::error::{FlowEngineError, Result};

/// OpenAI 兼容的 chat/completions 客户端
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new<S: Into<String>>(api_key: S, model: S) -> Self {
        Self::with_base_url("https://api.openai.com/v1", api_key, model)
    }

    pub fn with_base_url<S1, S2, S3>(base_url: S1, api_key: S2, model: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    #[instrument(skip(self, request))]
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.user}));

        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": request.temperature,
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FlowEngineError::Other(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlowEngineError::Other(anyhow::anyhow!(
                "chat completion failed with status {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| FlowEngineError::Other(e.into()))?;
        let content = payload["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| FlowEngineError::Other(anyhow::anyhow!("missing message content")))?;

        Ok(LlmResponse {
            content: content.to_string(),
            model: Some(model),
            transcript: Some(json!({"request": body, "response": payload})),
        })
    }
}
