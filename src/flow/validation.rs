use tracing::debug;

use crate::error::{FlowEngineError, Result};
use crate::expression::ValueSchema;
use crate::flow::constants::sources;
use crate::flow::{Flow, Node};
use crate::runner::RunnerRegistry;

/// 发布前校验
///
/// Rejects everything that must never surface mid-run: unknown
/// `(type, version)` pairs, params violating the runner's schema, references
/// to nodes that do not exist, dangling or cross-region successors and a
/// missing entry set. Runner-specific rules run through
/// [`NodeRunner::validate`](crate::runner::NodeRunner::validate).
pub fn validate_flow(flow: &Flow, registry: &RunnerRegistry) -> Result<()> {
    if flow.entry().is_empty() {
        return Err(FlowEngineError::InvalidDefinition(format!(
            "flow `{}` has no entry node",
            flow.code
        )));
    }
    for entry in flow.entry() {
        let node = flow.node(entry).ok_or_else(|| {
            FlowEngineError::InvalidDefinition(format!("entry `{entry}` is not a node"))
        })?;
        if node.parent_id.is_some() {
            return Err(FlowEngineError::InvalidDefinition(format!(
                "entry `{entry}` is nested inside `{}`",
                node.parent_id.as_deref().unwrap_or_default()
            )));
        }
    }

    for node in flow.nodes() {
        if let Some(parent) = &node.parent_id {
            if !flow.contains(parent) {
                return Err(FlowEngineError::InvalidDefinition(format!(
                    "node `{}` is nested in unknown node `{parent}`",
                    node.node_id
                )));
            }
        }
        check_targets(flow, node, &node.next_nodes)?;
        for schema in node.input.iter().chain(node.output.iter()) {
            check_references(flow, &node.node_id, schema)?;
        }

        let runner = registry.build_checked(node)?;
        runner.validate(flow, node)?;
    }

    debug!(flow = %flow.code, nodes = flow.nodes().len(), "flow validated");
    Ok(())
}

/// Every reference must name a node of `flow` or a reserved source.
pub(crate) fn check_references(flow: &Flow, owner: &str, schema: &ValueSchema) -> Result<()> {
    for (node_id, path) in schema.references() {
        if !sources::is_reserved(node_id) && !flow.contains(node_id) {
            return Err(FlowEngineError::InvalidExpression(format!(
                "node `{owner}` references unknown node `{node_id}` (path `{path}`)"
            )));
        }
    }
    Ok(())
}

/// Successors must exist and live in the same region as `node`.
pub(crate) fn check_targets(flow: &Flow, node: &Node, targets: &[String]) -> Result<()> {
    for target in targets {
        let Some(next) = flow.node(target) else {
            return Err(FlowEngineError::InvalidDefinition(format!(
                "node `{}` points to unknown node `{target}`",
                node.node_id
            )));
        };
        if next.parent_id != node.parent_id && next.parent_id.as_deref() != Some(node.node_id.as_str()) {
            return Err(FlowEngineError::InvalidDefinition(format!(
                "edge `{}` -> `{target}` crosses a region boundary",
                node.node_id
            )));
        }
    }
    Ok(())
}
