use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::row::NodeTestConfig;

/// 调试轨迹接收端
///
/// Receives one row per executed node, in execution order. Sinks are
/// append-only and must not block the scheduler.
pub trait DebugSink: Send + Sync {
    fn record(&self, execution_id: &str, row: &NodeTestConfig);
}

pub type DynDebugSink = Arc<dyn DebugSink>;

/// Keeps every row in memory; used by tests and the CLI.
#[derive(Default)]
pub struct MemoryDebugSink {
    rows: Mutex<Vec<(String, NodeTestConfig)>>,
}

impl MemoryDebugSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<NodeTestConfig> {
        self.rows.lock().iter().map(|(_, row)| row.clone()).collect()
    }

    pub fn rows_for(&self, execution_id: &str) -> Vec<NodeTestConfig> {
        self.rows
            .lock()
            .iter()
            .filter(|(id, _)| id == execution_id)
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.rows
            .lock()
            .iter()
            .map(|(_, row)| row.node_id.clone())
            .collect()
    }
}

impl DebugSink for MemoryDebugSink {
    fn record(&self, execution_id: &str, row: &NodeTestConfig) {
        self.rows.lock().push((execution_id.to_string(), row.clone()));
    }
}

/// Writes rows as `debug` events.
#[derive(Default, Clone, Copy)]
pub struct TracingDebugSink;

impl DebugSink for TracingDebugSink {
    fn record(&self, execution_id: &str, row: &NodeTestConfig) {
        debug!(
            execution_id = %execution_id,
            node = %row.node_id,
            node_type = %row.node_type,
            success = row.success,
            elapsed_ms = row.elapsed_ms,
            error = row.error_message.as_deref().unwrap_or(""),
            "node trace"
        );
    }
}

/// Forwards rows to a channel, e.g. for a live step-by-step debug view.
pub struct ChannelDebugSink {
    sender: mpsc::UnboundedSender<(String, NodeTestConfig)>,
}

impl ChannelDebugSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, NodeTestConfig)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DebugSink for ChannelDebugSink {
    fn record(&self, execution_id: &str, row: &NodeTestConfig) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.sender.send((execution_id.to_string(), row.clone()));
    }
}
