/// 工具模块 - 日志等通用设施
pub mod logging;

pub use logging::LoggingConfig;
