// 生命周期事件总线

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::trace::RunStatus;

/// 引擎发布的生命周期事件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    FlowSaved {
        code: String,
    },
    FlowPublished {
        code: String,
        version: u32,
    },
    FlowEnabledChanged {
        code: String,
        enabled: bool,
    },
    RunFinished {
        execution_id: String,
        flow_code: String,
        status: RunStatus,
    },
    RunMaxRetriesExceeded {
        unit_id: String,
        retry_times: u32,
        last_error: Option<String>,
    },
}

/// 基于 broadcast 的事件总线；发布方不关心是否有订阅者
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: EngineEvent) {
        trace!(?event, "publishing engine event");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::default();
        bus.publish(EngineEvent::FlowSaved { code: "lost".into() });
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::FlowSaved { code: "a".into() });
        bus.publish(EngineEvent::FlowPublished {
            code: "a".into(),
            version: 1,
        });
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::FlowSaved { code: "a".into() });
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::FlowPublished { version: 1, .. }
        ));
    }
}
