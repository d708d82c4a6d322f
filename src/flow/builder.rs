use crate::error::Result;
use crate::flow::constants::node_types;
use crate::flow::nodes::Node;
use crate::flow::types::{Edge, Flow, FlowDefinition, FlowType};

/// Flow 构建器
///
/// Assembles a [`FlowDefinition`] in code and turns it into a [`Flow`] with
/// the same checks as the JSON loader.
pub struct FlowBuilder {
    definition: FlowDefinition,
}

impl FlowBuilder {
    pub fn new<T: Into<String>>(code: T) -> Self {
        let code = code.into();
        Self {
            definition: FlowDefinition {
                name: code.clone(),
                code,
                version: 1,
                flow_type: FlowType::Main,
                enabled: true,
                organization_code: None,
                entry: Vec::new(),
                nodes: Vec::new(),
                edges: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = name.into();
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.definition.version = version;
        self
    }

    pub fn flow_type(mut self, flow_type: FlowType) -> Self {
        self.definition.flow_type = flow_type;
        self
    }

    pub fn organization(mut self, organization_code: impl Into<String>) -> Self {
        self.definition.organization_code = Some(organization_code.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.definition.enabled = false;
        self
    }

    /// Overrides the default entry set (all top-level start nodes).
    pub fn entry(mut self, node_id: impl Into<String>) -> Self {
        self.definition.entry.push(node_id.into());
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.definition.nodes.push(node);
        self
    }

    pub fn start(self, node_id: impl Into<String>) -> Self {
        self.node(Node::new(node_id, node_types::START))
    }

    pub fn end(self, node_id: impl Into<String>) -> Self {
        self.node(Node::new(node_id, node_types::END))
    }

    pub fn connect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.definition.edges.push(Edge {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn build(self) -> Result<Flow> {
        Flow::try_from(self.definition)
    }
}
