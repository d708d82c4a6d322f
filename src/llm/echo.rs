use async_trait::async_trait;
use serde_json::json;

use super::client::LlmClient;
use super::types::{LlmRequest, LlmResponse};
use crate::error::Result;

/// 本地回显客户端，不访问网络
#[derive(Default, Clone)]
pub struct LocalEchoClient;

#[async_trait]
impl LlmClient for LocalEchoClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut content = String::new();
        if let Some(system) = &request.system {
            content.push_str(&format!("[System:{}] ", system.trim()));
        }
        content.push_str(&request.user);
        Ok(LlmResponse {
            content,
            model: Some(request.model.clone().unwrap_or_else(|| "local-echo".to_string())),
            transcript: Some(json!({
                "client": "local_echo",
                "request": request,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_user_prompt_with_system() {
        let response = LocalEchoClient
            .complete(LlmRequest::new("hello").with_system(" be brief "))
            .await
            .unwrap();
        assert_eq!(response.content, "[System:be brief] hello");
        assert_eq!(response.model.as_deref(), Some("local-echo"));
        assert!(response.transcript.is_some());
    }
}
