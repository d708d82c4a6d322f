pub mod archive;
pub mod config;
pub mod error;
pub mod events;
pub mod expression;
pub mod flow;
pub mod http;
pub mod llm;
pub mod message;
pub mod retry;
pub mod runner;
pub mod runtime;
pub mod schema;
pub mod state;
pub mod tools;
pub mod trace;
pub mod utils;

pub use archive::{ArchiveRecord, ExecutionArchive, LocalObjectStorage, ObjectStorage};
pub use config::{ArchiveConfig, EngineConfig, RetryConfig};
pub use error::{FlowEngineError, Result};
pub use events::{EngineEvent, EventBus};
pub use expression::{resolve, ContextLookup, Expression, ResolvedInput, Token, ValueSchema};
pub use flow::{
    load_flow_from_file, load_flow_from_str, validate_flow, Condition, Edge, Flow, FlowBuilder,
    FlowDefinition, FlowRepository, FlowType, MemoryFlowRepository, Node, Operator,
};
pub use llm::{DynLlmClient, LlmClient, LlmRequest, LlmResponse, LocalEchoClient};
pub use retry::{
    action_from_fn, ChannelQueue, DeferredRunAction, MemoryRetryStore, RetryShell, RetryUnit,
    RetryUnitStore, UnitAction, UnitQueue, UnitStatus,
};
pub use runner::{
    NodeContext, NodeRunner, RunnerManifest, RunnerRegistry, RunnerServices, VertexResult,
};
pub use runtime::{CancelHandle, CancelReason, FlowExecution, FlowExecutor};
pub use schema::{Schema, SchemaKind};
pub use state::{ExecutionData, TriggerData, TriggerType};
pub use tools::{Tool, ToolInvocation, ToolManifest, ToolOutput, ToolRegistry};
pub use trace::{DebugSink, MemoryDebugSink, NodeTestConfig, RunStatus, RunTrace};
pub use utils::logging;
