use async_trait::async_trait;
use serde_json::json;

use super::tool::{Tool, ToolInvocation, ToolOutput};
use crate::error::Result;

/// 原样返回参数的工具
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    async fn call(&self, invocation: ToolInvocation) -> Result<ToolOutput> {
        Ok(ToolOutput::new(invocation.input.clone()).with_transcript(json!({
            "tool": self.name(),
            "execution_id": invocation.execution_id,
        })))
    }
}
