use std::panic::AssertUnwindSafe;

use chrono::{Duration, Utc};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::action::DynUnitAction;
use super::queue::DynUnitQueue;
use super::store::DynRetryUnitStore;
use super::unit::{RetryUnit, UnitStatus};
use crate::config::RetryConfig;
use crate::error::{FlowEngineError, Result};
use crate::events::{EngineEvent, EventBus};

/// 重试外壳
///
/// Runs one persisted unit per [`RetryShell::retry`] call. A failure bumps
/// `retry_times` and re-enqueues the unit until `max_retries` is reached,
/// after which it is marked `Failed` and `RunMaxRetriesExceeded` is published.
pub struct RetryShell {
    store: DynRetryUnitStore,
    queue: DynUnitQueue,
    action: DynUnitAction,
    config: RetryConfig,
    events: Option<EventBus>,
}

impl RetryShell {
    pub fn new(
        store: DynRetryUnitStore,
        queue: DynUnitQueue,
        action: DynUnitAction,
        config: RetryConfig,
    ) -> Self {
        Self {
            store,
            queue,
            action,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Persists a new `Wait` unit and enqueues it.
    pub async fn submit(&self, payload: Value) -> Result<String> {
        let unit = RetryUnit::new(payload);
        let id = unit.id.clone();
        self.store.insert(unit).await?;
        self.queue.enqueue(&id).await?;
        debug!(unit = %id, "unit submitted");
        Ok(id)
    }

    pub async fn retry(&self, unit_id: &str) -> Result<UnitStatus> {
        let mut unit = self
            .store
            .get(unit_id)
            .await?
            .ok_or_else(|| FlowEngineError::RetryUnitNotFound(unit_id.to_string()))?;
        if unit.status.is_terminal() {
            debug!(unit = %unit_id, status = ?unit.status, "unit already settled");
            return Ok(unit.status);
        }

        unit.transition(UnitStatus::InExecution);
        self.store.update(&unit).await?;

        let attempt = AssertUnwindSafe(self.action.execute(&unit))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(FlowEngineError::Other(anyhow::anyhow!("unit action panicked"))));

        match attempt {
            Ok(()) => {
                unit.last_error = None;
                unit.transition(UnitStatus::Completed);
                self.store.update(&unit).await?;
                info!(unit = %unit_id, attempts = unit.retry_times + 1, "unit completed");
            }
            Err(err) => {
                unit.retry_times += 1;
                unit.last_error = Some(err.to_string());
                if unit.retry_times >= self.config.max_retries {
                    unit.transition(UnitStatus::Failed);
                    self.store.update(&unit).await?;
                    error!(
                        unit = %unit_id,
                        retry_times = unit.retry_times,
                        error = %err,
                        "unit exhausted its retries"
                    );
                    if let Some(events) = &self.events {
                        events.publish(EngineEvent::RunMaxRetriesExceeded {
                            unit_id: unit.id.clone(),
                            retry_times: unit.retry_times,
                            last_error: unit.last_error.clone(),
                        });
                    }
                } else {
                    unit.transition(UnitStatus::Wait);
                    self.store.update(&unit).await?;
                    warn!(unit = %unit_id, retry_times = unit.retry_times, error = %err, "unit failed; re-enqueued");
                    self.queue.enqueue(unit_id).await?;
                }
            }
        }
        Ok(unit.status)
    }

    /// `timeout_secs` as a chrono duration, saturating at the largest span.
    fn timeout(&self) -> Duration {
        i64::try_from(self.config.timeout_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Re-enqueues units stuck in `Wait`/`InExecution` past the timeout.
    pub async fn recover_timed_out(&self) -> Result<Vec<String>> {
        let stuck = self.store.find_timed_out(self.timeout(), Utc::now()).await?;
        let mut recovered = Vec::with_capacity(stuck.len());
        for mut unit in stuck {
            unit.transition(UnitStatus::Wait);
            self.store.update(&unit).await?;
            self.queue.enqueue(&unit.id).await?;
            recovered.push(unit.id);
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), "timed-out units re-enqueued");
        }
        Ok(recovered)
    }

    /// Processes queued ids until `deadline` passes or the channel closes.
    /// Returns the number of attempts made.
    pub async fn run_worker(&self, receiver: &mut mpsc::UnboundedReceiver<String>, deadline: Instant) -> usize {
        let mut attempts = 0;
        while let Ok(Some(unit_id)) = tokio::time::timeout_at(deadline, receiver.recv()).await {
            self.process(&unit_id).await;
            attempts += 1;
        }
        attempts
    }

    /// Processes whatever is queued right now, including re-enqueued retries,
    /// and returns once the queue is empty.
    pub async fn drain(&self, receiver: &mut mpsc::UnboundedReceiver<String>) -> usize {
        let mut attempts = 0;
        while let Ok(unit_id) = receiver.try_recv() {
            self.process(&unit_id).await;
            attempts += 1;
        }
        attempts
    }

    async fn process(&self, unit_id: &str) {
        if let Err(err) = self.retry(unit_id).await {
            warn!(unit = %unit_id, error = %err, "retry attempt could not run");
        }
    }
}
