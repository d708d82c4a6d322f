use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 触发来源
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Manual,
    Chat,
    Api,
    Schedule,
    SubFlow,
    Retry,
}

/// 触发数据
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriggerData {
    #[serde(default)]
    pub trigger_type: TriggerType,
    #[serde(default = "TriggerData::empty_object")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_code: Option<String>,
    #[serde(default = "TriggerData::empty_object")]
    pub metadata: Value,
}

impl TriggerData {
    pub fn new(trigger_type: TriggerType, payload: Value) -> Self {
        Self {
            trigger_type,
            payload,
            user_id: None,
            organization_code: None,
            metadata: Self::empty_object(),
        }
    }

    pub fn manual(payload: Value) -> Self {
        Self::new(TriggerType::Manual, payload)
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_organization(mut self, organization_code: impl Into<String>) -> Self {
        self.organization_code = Some(organization_code.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    fn empty_object() -> Value {
        Value::Object(Map::new())
    }
}
