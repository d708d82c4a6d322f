use thiserror::Error;

use crate::error::FlowEngineError;

/// Schema 错误类型
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema validation failed at `{}`: {message}", path.join("."))]
    Validation { message: String, path: Vec<String> },
}

impl From<SchemaError> for FlowEngineError {
    fn from(error: SchemaError) -> Self {
        FlowEngineError::InvalidDefinition(error.to_string())
    }
}
