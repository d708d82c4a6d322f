use std::sync::Arc;

use tokio::sync::watch;

use crate::error::FlowEngineError;

/// 取消原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    Timeout(u64),
}

impl From<CancelReason> for FlowEngineError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => FlowEngineError::Cancelled,
            CancelReason::Timeout(ms) => FlowEngineError::Timeout(ms),
        }
    }
}

/// 运行级取消句柄
///
/// Clones share one flag. The first reason recorded sticks.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<Option<CancelReason>>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Cancelled);
    }

    pub(crate) fn cancel_with(&self, reason: CancelReason) {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender.borrow().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.sender.borrow()
    }

    /// Resolves once the handle is cancelled.
    pub async fn cancelled(&self) -> CancelReason {
        let mut receiver = self.sender.subscribe();
        loop {
            if let Some(reason) = *receiver.borrow_and_update() {
                return reason;
            }
            if receiver.changed().await.is_err() {
                // The sender lives as long as `self`.
                futures::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_reason_wins_and_wakes_waiters() {
        let handle = CancelHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.cancelled().await })
        };
        handle.cancel_with(CancelReason::Timeout(50));
        handle.cancel();
        assert_eq!(waiter.await.unwrap(), CancelReason::Timeout(50));
        assert_eq!(handle.reason(), Some(CancelReason::Timeout(50)));
        assert!(handle.is_cancelled());
    }
}
