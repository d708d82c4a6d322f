use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::FlowEngineError;
use crate::flow::constants::node_types;
use crate::flow::nodes::Node;

/// Flow 类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    #[default]
    Main,
    Sub,
}

/// 编辑器中画出的有向边
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Flow 的序列化形态
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub code: String,
    #[serde(default = "FlowDefinition::default_version")]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub flow_type: FlowType,
    #[serde(default = "FlowDefinition::default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_code: Option<String>,
    #[serde(default)]
    pub entry: Vec<String>,
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Edge>,
}

impl FlowDefinition {
    fn default_version() -> u32 {
        1
    }

    fn default_enabled() -> bool {
        true
    }
}

/// Flow 工作流
///
/// Built from a [`FlowDefinition`]: edges are folded into the source node's
/// `next_nodes`, the entry set defaults to the top-level start nodes and node
/// ids are indexed. A `Flow` is never mutated by a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "FlowDefinition", into = "FlowDefinition")]
pub struct Flow {
    pub code: String,
    pub version: u32,
    pub name: String,
    pub flow_type: FlowType,
    pub enabled: bool,
    pub organization_code: Option<String>,
    entry: Vec<String>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
}

impl Flow {
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.index.get(node_id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn entry(&self) -> &[String] {
        &self.entry
    }

    pub fn children(&self, node_id: &str) -> &[String] {
        self.node(node_id)
            .map(|node| node.next_nodes.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes directly nested under `parent_id`.
    pub fn region<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.parent_id.as_deref() == Some(parent_id))
    }

    pub fn is_sub(&self) -> bool {
        self.flow_type == FlowType::Sub
    }

    pub fn definition(&self) -> FlowDefinition {
        FlowDefinition::from(self.clone())
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl TryFrom<FlowDefinition> for Flow {
    type Error = FlowEngineError;

    fn try_from(definition: FlowDefinition) -> Result<Self, Self::Error> {
        let FlowDefinition {
            code,
            version,
            name,
            flow_type,
            enabled,
            organization_code,
            entry,
            mut nodes,
            edges,
        } = definition;

        if code.trim().is_empty() {
            return Err(FlowEngineError::InvalidDefinition(
                "flow code must not be empty".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (idx, node) in nodes.iter().enumerate() {
            if node.node_id.is_empty() {
                return Err(FlowEngineError::InvalidDefinition(format!(
                    "node #{idx} has an empty node_id"
                )));
            }
            if index.insert(node.node_id.clone(), idx).is_some() {
                return Err(FlowEngineError::InvalidDefinition(format!(
                    "duplicate node id `{}`",
                    node.node_id
                )));
            }
        }

        for edge in &edges {
            let Some(&idx) = index.get(&edge.from) else {
                return Err(FlowEngineError::InvalidDefinition(format!(
                    "edge source `{}` is not a node",
                    edge.from
                )));
            };
            let node = &mut nodes[idx];
            if !node.next_nodes.contains(&edge.to) {
                node.next_nodes.push(edge.to.clone());
            }
        }

        for node in &mut nodes {
            let mut seen = HashSet::new();
            node.next_nodes.retain(|next| seen.insert(next.clone()));
        }

        let entry = if entry.is_empty() {
            nodes
                .iter()
                .filter(|node| node.parent_id.is_none() && node.is_type(node_types::START))
                .map(|node| node.node_id.clone())
                .collect()
        } else {
            entry
        };

        Ok(Flow {
            code,
            version,
            name,
            flow_type,
            enabled,
            organization_code,
            entry,
            nodes,
            edges,
            index,
        })
    }
}

impl From<Flow> for FlowDefinition {
    fn from(flow: Flow) -> Self {
        FlowDefinition {
            code: flow.code,
            version: flow.version,
            name: flow.name,
            flow_type: flow.flow_type,
            enabled: flow.enabled,
            organization_code: flow.organization_code,
            entry: flow.entry,
            nodes: flow.nodes,
            edges: flow.edges,
        }
    }
}
