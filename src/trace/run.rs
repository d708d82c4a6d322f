use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::row::NodeTestConfig;
use crate::error::{FlowEngineError, Result};
use crate::state::ExecutionData;

/// Current on-disk trace format; bump when the layout changes incompatibly.
pub const TRACE_FORMAT_VERSION: u32 = 1;

/// 运行状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// 一次运行的完整轨迹（归档格式）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunTrace {
    pub format_version: u32,
    pub execution_id: String,
    #[serde(default)]
    pub organization_code: String,
    pub flow_code: String,
    pub flow_version: u32,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rows: Vec<NodeTestConfig>,
    #[serde(default)]
    pub node_contexts: BTreeMap<String, Value>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunTrace {
    /// Snapshots `data` into a trace.
    pub fn capture(
        data: &ExecutionData,
        status: RunStatus,
        started_at: DateTime<Utc>,
        rows: Vec<NodeTestConfig>,
        error: Option<String>,
    ) -> Self {
        let flow = data.flow();
        Self {
            format_version: TRACE_FORMAT_VERSION,
            execution_id: data.execution_id().to_string(),
            organization_code: data.organization_code().to_string(),
            flow_code: flow.code.clone(),
            flow_version: flow.version,
            status,
            started_at,
            finished_at: status.is_terminal().then(Utc::now),
            rows,
            node_contexts: data.node_contexts(),
            variables: data.variables(),
            end_node_id: data.end_node(),
            output: data.output(),
            error,
        }
    }

    pub fn row(&self, node_id: &str) -> Option<&NodeTestConfig> {
        self.rows.iter().find(|row| row.node_id == node_id)
    }

    pub fn visited(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.node_id.as_str())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an archived trace. Traces written by a newer format are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: Value = serde_json::from_slice(bytes)?;
        let version = raw
            .get("format_version")
            .and_then(Value::as_u64)
            .ok_or_else(|| FlowEngineError::Archive("trace has no format_version".to_string()))?;
        if version > u64::from(TRACE_FORMAT_VERSION) {
            return Err(FlowEngineError::Archive(format!(
                "trace format version {version} is newer than supported {TRACE_FORMAT_VERSION}"
            )));
        }
        Ok(serde_json::from_value(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "format_version": 1,
            "execution_id": "e1",
            "flow_code": "demo",
            "flow_version": 2,
            "status": "completed",
            "started_at": "2024-01-01T00:00:00Z"
        })
    }

    #[test]
    fn decodes_current_version() {
        let bytes = serde_json::to_vec(&sample()).unwrap();
        let trace = RunTrace::from_bytes(&bytes).unwrap();
        assert_eq!(trace.status, RunStatus::Completed);
        assert!(trace.rows.is_empty());
        assert_eq!(trace.flow_version, 2);
    }

    #[test]
    fn rejects_newer_format() {
        let mut raw = sample();
        raw["format_version"] = json!(TRACE_FORMAT_VERSION + 1);
        let err = RunTrace::from_bytes(&serde_json::to_vec(&raw).unwrap()).unwrap_err();
        assert!(matches!(err, FlowEngineError::Archive(_)));
    }
}
