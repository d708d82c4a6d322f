use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::expression::ValueSchema;
use crate::flow::constants::versions;

/// Flow 节点
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub node_id: String,
    pub node_type: String,
    #[serde(default = "Node::default_version")]
    pub node_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "Node::default_params")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ValueSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ValueSchema>,
    #[serde(default)]
    pub next_nodes: Vec<String>,
    /// 所属的子区域（例如循环体），只用于结构归属，不控制生命周期
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Node {
    pub fn new(node_id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            node_version: Self::default_version(),
            name: None,
            params: Self::default_params(),
            input: None,
            output: None,
            next_nodes: Vec::new(),
            parent_id: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.node_version = version.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_input(mut self, input: ValueSchema) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: ValueSchema) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_next<I, S>(mut self, next: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_nodes.extend(next.into_iter().map(Into::into));
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn is_type(&self, node_type: &str) -> bool {
        self.node_type == node_type
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.node_id)
    }

    /// Typed view of `params`; a missing or null bag reads as `{}`.
    pub fn params_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        match &self.params {
            Value::Null => serde_json::from_value(Value::Object(Map::new())),
            other => serde_json::from_value(other.clone()),
        }
    }

    fn default_version() -> String {
        versions::DEFAULT.to_string()
    }

    fn default_params() -> Value {
        Value::Object(Map::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_with_defaults() {
        let node: Node = serde_json::from_value(json!({
            "node_id": "n1",
            "node_type": "end"
        }))
        .unwrap();
        assert_eq!(node.node_version, "v0");
        assert_eq!(node.params, json!({}));
        assert!(node.next_nodes.is_empty());
        assert!(node.parent_id.is_none());
    }

    #[test]
    fn params_as_treats_null_as_empty_object() {
        #[derive(Deserialize)]
        struct Params {
            #[serde(default)]
            limit: Option<u32>,
        }
        let node = Node::new("n", "tool").with_params(Value::Null);
        let params: Params = node.params_as().unwrap();
        assert!(params.limit.is_none());
    }
}
