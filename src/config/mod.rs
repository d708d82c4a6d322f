// 引擎配置

mod engine;
mod env;

pub use engine::{ArchiveConfig, EngineConfig, RetryConfig};
pub use env::EnvConfig;
