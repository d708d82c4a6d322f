use std::path::Path;

use serde::{Deserialize, Serialize};

use super::env::EnvConfig;
use crate::error::Result;

/// 引擎配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Node invocations in flight per region walk.
    pub max_concurrency: usize,
    /// Node executions per run, loop bodies and retries included.
    pub max_steps: usize,
    pub run_timeout_ms: Option<u64>,
    pub max_sub_flow_depth: usize,
    pub default_loop_max_iterations: usize,
    pub archive: ArchiveConfig,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_steps: 10_000,
            run_timeout_ms: None,
            max_sub_flow_depth: 8,
            default_loop_max_iterations: 100,
            archive: ArchiveConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// 执行归档配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Traces larger than this are dropped instead of written.
    pub max_size_bytes: usize,
    /// Traces up to this size stay inline; 0 sends everything to object storage.
    pub inline_limit_bytes: usize,
    /// Most inline traces kept at once; the oldest is evicted past this.
    /// Inline traces live in process memory only and are lost on restart.
    pub inline_capacity: usize,
    pub directory_hint: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 100 * 1024 * 1024,
            inline_limit_bytes: 64 * 1024,
            inline_capacity: 1024,
            directory_hint: "flow-execution".to_string(),
        }
    }
}

/// 重试配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Units untouched for longer than this are considered stuck.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_secs: 300,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Applies `FLOWENGINE_*` overrides on top of the loaded values.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Some(value) = EnvConfig::parse_optional("FLOWENGINE_MAX_CONCURRENCY")? {
            self.max_concurrency = value;
        }
        if let Some(value) = EnvConfig::parse_optional("FLOWENGINE_MAX_STEPS")? {
            self.max_steps = value;
        }
        if let Some(value) = EnvConfig::parse_optional("FLOWENGINE_RUN_TIMEOUT_MS")? {
            self.run_timeout_ms = Some(value);
        }
        if let Some(value) = EnvConfig::parse_optional("FLOWENGINE_ARCHIVE_MAX_BYTES")? {
            self.archive.max_size_bytes = value;
        }
        if let Some(value) = EnvConfig::parse_optional("FLOWENGINE_RETRY_MAX")? {
            self.retry.max_retries = value;
        }
        self.max_concurrency = self.max_concurrency.max(1);
        Ok(self)
    }
}
