use std::env;
use std::str::FromStr;

use crate::error::{FlowEngineError, Result};

/// Name of the variable that switches on verbose diagnostics.
pub const DEBUG_ENV: &str = "FLOWENGINE_DEBUG";

/// 环境变量配置管理
pub struct EnvConfig;

impl EnvConfig {
    /// 从环境变量获取值
    pub fn get_env(key: &str) -> Result<String> {
        env::var(key)
            .map_err(|_| FlowEngineError::Config(format!("environment variable `{key}` is not set")))
    }

    /// 获取可选的环境变量
    pub fn get_env_optional(key: &str) -> Option<String> {
        env::var(key).ok().filter(|value| !value.trim().is_empty())
    }

    /// Parses an optional variable; a present but malformed value is an error.
    pub fn parse_optional<T>(key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match Self::get_env_optional(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                FlowEngineError::Config(format!("environment variable `{key}`=`{raw}`: {e}"))
            }),
        }
    }

    /// 检查是否启用调试模式
    pub fn is_debug_mode() -> bool {
        env::var(DEBUG_ENV).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_optional_reports_malformed_numbers() {
        env::set_var("FLOWENGINE_TEST_PARSE_OK", "12");
        env::set_var("FLOWENGINE_TEST_PARSE_BAD", "twelve");
        assert_eq!(
            EnvConfig::parse_optional::<usize>("FLOWENGINE_TEST_PARSE_OK").unwrap(),
            Some(12)
        );
        assert!(EnvConfig::parse_optional::<usize>("FLOWENGINE_TEST_PARSE_BAD").is_err());
        assert_eq!(
            EnvConfig::parse_optional::<usize>("FLOWENGINE_TEST_PARSE_MISSING").unwrap(),
            None
        );
        env::remove_var("FLOWENGINE_TEST_PARSE_OK");
        env::remove_var("FLOWENGINE_TEST_PARSE_BAD");
    }

    #[test]
    fn get_env_missing_is_config_error() {
        let err = EnvConfig::get_env("FLOWENGINE_TEST_DEFINITELY_UNSET").unwrap_err();
        assert!(matches!(err, FlowEngineError::Config(_)));
    }
}
