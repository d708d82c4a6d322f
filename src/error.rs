use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowEngineError>;

#[derive(Debug, Error)]
pub enum FlowEngineError {
    #[error("unknown node `{0}` in flow")]
    UnknownNode(String),
    #[error("no runner registered for node type `{node_type}` version `{version}`")]
    RunnerNotRegistered { node_type: String, version: String },
    #[error("invalid flow definition: {0}")]
    InvalidDefinition(String),
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("node `{node}` requires input `{field}` which is undefined")]
    MissingInput { node: String, field: String },
    #[error("node `{node}` failed: {message}")]
    Runner { node: String, message: String },
    #[error("flow `{code}` (version {version:?}) not found")]
    FlowNotFound { code: String, version: Option<u32> },
    #[error("flow `{0}` is disabled")]
    FlowNotEnabled(String),
    #[error("flow `{code}` version {version} is already published")]
    FlowAlreadyPublished { code: String, version: u32 },
    #[error("flow run cancelled")]
    Cancelled,
    #[error("flow run timed out after {0} ms")]
    Timeout(u64),
    #[error("maximum node executions {0} exceeded")]
    MaxStepsExceeded(usize),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("retry unit `{0}` not found")]
    RetryUnitNotFound(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowEngineError {
    pub fn runner(node: impl Into<String>, message: impl Into<String>) -> Self {
        FlowEngineError::Runner {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Errors that must surface when a flow is validated or published, never mid-run.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            FlowEngineError::RunnerNotRegistered { .. }
                | FlowEngineError::InvalidDefinition(_)
                | FlowEngineError::InvalidExpression(_)
                | FlowEngineError::UnknownNode(_)
        )
    }
}
