use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{FlowEngineError, Result};

/// 重试队列
#[async_trait]
pub trait UnitQueue: Send + Sync {
    async fn enqueue(&self, unit_id: &str) -> Result<()>;
}

pub type DynUnitQueue = Arc<dyn UnitQueue>;

/// 基于 tokio mpsc 的进程内队列
#[derive(Clone)]
pub struct ChannelQueue {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl UnitQueue for ChannelQueue {
    async fn enqueue(&self, unit_id: &str) -> Result<()> {
        self.sender
            .send(unit_id.to_string())
            .map_err(|_| FlowEngineError::Storage("retry queue is closed".to_string()))
    }
}
