// 节点执行器框架

pub mod builtin;
mod context;
mod manifest;
mod registry;

pub use context::{NodeContext, NodeRunner, RegionOutcome, SubFlowRun, VertexResult, Walker};
pub use manifest::{RunnerManifest, RunnerManifestBuilder};
pub use registry::{RunnerFactory, RunnerRegistry, RunnerServices};

use serde::de::DeserializeOwned;

use crate::error::{FlowEngineError, Result};
use crate::flow::Node;

/// Reads a node's `params` bag; malformed params are a definition error.
pub(crate) fn parse_params<P: DeserializeOwned>(node: &Node) -> Result<P> {
    node.params_as().map_err(|e| {
        FlowEngineError::InvalidDefinition(format!("node `{}` params: {e}", node.node_id))
    })
}
