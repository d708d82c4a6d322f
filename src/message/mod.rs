// 历史消息检索接口

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 会话中的一条消息
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(
        conversation_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: role.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default = "MessageQuery::default_limit")]
    pub limit: usize,
}

impl MessageQuery {
    pub fn default_limit() -> usize {
        10
    }
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            conversation_id: None,
            keyword: None,
            limit: Self::default_limit(),
        }
    }
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Newest messages first.
    async fn search(&self, query: &MessageQuery) -> Result<Vec<StoredMessage>>;
}

pub type DynMessageStore = Arc<dyn MessageStore>;

/// 内存消息存储
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<StoredMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, message: StoredMessage) {
        self.messages.write().push(message);
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn search(&self, query: &MessageQuery) -> Result<Vec<StoredMessage>> {
        let keyword = query.keyword.as_deref().map(str::to_lowercase);
        let messages = self.messages.read();
        Ok(messages
            .iter()
            .rev()
            .filter(|m| {
                query
                    .conversation_id
                    .as_deref()
                    .map_or(true, |id| m.conversation_id == id)
            })
            .filter(|m| {
                keyword
                    .as_deref()
                    .map_or(true, |k| m.content.to_lowercase().contains(k))
            })
            .take(query.limit)
            .cloned()
            .collect())
    }
}
