// LLM 客户端接口

mod client;
mod echo;
#[cfg(feature = "http-client")]
mod openai;
mod types;

pub use client::{DynLlmClient, LlmClient};
pub use echo::LocalEchoClient;
#[cfg(feature = "http-client")]
pub use openai::OpenAiClient;
pub use types::{LlmRequest, LlmResponse};
