use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::flow::types::{Flow, FlowDefinition};

/// 从 JSON 字符串加载 Flow
pub fn load_flow_from_str(raw: &str) -> Result<Flow> {
    let definition: FlowDefinition = serde_json::from_str(raw)?;
    let flow = Flow::try_from(definition)?;
    debug!(flow = %flow.code, version = flow.version, nodes = flow.nodes().len(), "flow loaded");
    Ok(flow)
}

/// 从 JSON 文件加载 Flow
pub fn load_flow_from_file(path: impl AsRef<Path>) -> Result<Flow> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    load_flow_from_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowEngineError;

    const FLOW: &str = r#"{
        "code": "greet",
        "version": 3,
        "nodes": [
            {"node_id": "start", "node_type": "start"},
            {
                "node_id": "end",
                "node_type": "end",
                "input": {"type": "object", "fields": {"text": {"type": "expression", "tokens": [
                    {"type": "input", "value": "hi "},
                    {"type": "reference", "node_id": "start", "path": "name"}
                ]}}}
            }
        ],
        "edges": [{"from": "start", "to": "end"}]
    }"#;

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greet.json");
        std::fs::write(&path, FLOW).unwrap();
        let flow = load_flow_from_file(&path).unwrap();
        assert_eq!(flow.version, 3);
        assert_eq!(flow.children("start"), ["end".to_string()]);
        assert!(flow.node("end").and_then(|n| n.input.as_ref()).is_some());
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = load_flow_from_str("{").unwrap_err();
        assert!(matches!(err, FlowEngineError::Serialization(_)));
    }
}
