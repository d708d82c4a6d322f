use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 重试单元状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    #[default]
    Wait,
    InExecution,
    Completed,
    Failed,
}

impl UnitStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitStatus::Completed | UnitStatus::Failed)
    }
}

/// 一条持久化的异步工作单元
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryUnit {
    pub id: String,
    pub payload: Value,
    pub retry_times: u32,
    pub status: UnitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RetryUnit {
    pub fn new(payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            retry_times: 0,
            status: UnitStatus::Wait,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn transition(&mut self, status: UnitStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Stuck in `Wait`/`InExecution` since before `cutoff`.
    pub fn is_timed_out(&self, cutoff: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.updated_at < cutoff
    }
}
