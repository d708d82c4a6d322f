use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};

use super::cancel::{CancelHandle, CancelReason};
use super::walker::RunScope;
use crate::archive::{ArchiveRecord, ExecutionArchive};
use crate::config::EngineConfig;
use crate::error::{FlowEngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::flow::{validate_flow, DynFlowRepository, Flow};
use crate::runner::RunnerRegistry;
use crate::state::{ExecutionData, TriggerData};
use crate::trace::{DynDebugSink, RunStatus, RunTrace};

/// 一次运行的结果
#[derive(Debug)]
pub struct FlowExecution {
    pub execution_id: String,
    pub flow_code: String,
    /// `Completed`, `Failed` or `Cancelled`.
    pub status: RunStatus,
    /// Output of the End node that terminated the run.
    pub output: Option<Value>,
    pub end_node_id: Option<String>,
    pub error: Option<FlowEngineError>,
    pub trace: RunTrace,
    /// `None` when no archive is configured or archiving failed.
    pub archive: Option<ArchiveRecord>,
}

impl FlowExecution {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Flow 执行器
///
/// Owns everything shared between runs: the runner registry, engine
/// configuration and the optional collaborators. Cloning is cheap.
#[derive(Clone)]
pub struct FlowExecutor {
    registry: Arc<RunnerRegistry>,
    config: Arc<EngineConfig>,
    archive: Option<Arc<ExecutionArchive>>,
    debug_sink: Option<DynDebugSink>,
    events: Option<EventBus>,
    flows: Option<DynFlowRepository>,
}

impl FlowExecutor {
    pub fn new(registry: RunnerRegistry, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            archive: None,
            debug_sink: None,
            events: None,
            flows: None,
        }
    }

    pub fn with_archive(mut self, archive: Arc<ExecutionArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_debug_sink(mut self, sink: DynDebugSink) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Needed by sub-flow nodes and [`FlowExecutor::run_published`].
    pub fn with_flow_repository(mut self, flows: DynFlowRepository) -> Self {
        self.flows = Some(flows);
        self
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn archive(&self) -> Option<&Arc<ExecutionArchive>> {
        self.archive.as_ref()
    }

    pub(crate) fn debug_sink(&self) -> Option<&DynDebugSink> {
        self.debug_sink.as_ref()
    }

    pub(crate) fn flow_repository(&self) -> Option<&DynFlowRepository> {
        self.flows.as_ref()
    }

    /// Publish-time checks against this executor's registry.
    pub fn validate(&self, flow: &Flow) -> Result<()> {
        validate_flow(flow, &self.registry)
    }

    pub async fn run(&self, flow: impl Into<Arc<Flow>>, trigger: TriggerData) -> Result<FlowExecution> {
        self.run_with_cancel(flow, trigger, CancelHandle::new()).await
    }

    /// Loads `code` from the flow repository and runs it.
    pub async fn run_published(
        &self,
        code: &str,
        version: Option<u32>,
        trigger: TriggerData,
    ) -> Result<FlowExecution> {
        let flows = self
            .flows
            .as_ref()
            .ok_or_else(|| FlowEngineError::FlowNotFound {
                code: code.to_string(),
                version,
            })?;
        let flow = flows.load_flow(code, version).await?;
        self.run(flow, trigger).await
    }

    /// Runs `flow` until it finishes, fails or `cancel` fires. Errors are
    /// returned only when the run cannot start; node failures are reported
    /// through [`FlowExecution::status`].
    pub async fn run_with_cancel(
        &self,
        flow: impl Into<Arc<Flow>>,
        trigger: TriggerData,
        cancel: CancelHandle,
    ) -> Result<FlowExecution> {
        let timer = self.config.run_timeout_ms.map(|ms| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                cancel.cancel_with(CancelReason::Timeout(ms));
            })
        });
        let result = self.execute(flow.into(), trigger, 0, cancel).await;
        if let Some(timer) = timer {
            timer.abort();
        }
        let mut execution = result?;

        if let Some(archive) = &self.archive {
            execution.archive = match archive
                .put(
                    &execution.trace.organization_code,
                    &execution.execution_id,
                    &execution.trace,
                )
                .await
            {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(execution_id = %execution.execution_id, error = %err, "archiving failed");
                    None
                }
            };
        }
        if let Some(events) = &self.events {
            events.publish(EngineEvent::RunFinished {
                execution_id: execution.execution_id.clone(),
                flow_code: execution.flow_code.clone(),
                status: execution.status,
            });
        }
        Ok(execution)
    }

    pub(crate) async fn execute(
        &self,
        flow: Arc<Flow>,
        trigger: TriggerData,
        depth: usize,
        cancel: CancelHandle,
    ) -> Result<FlowExecution> {
        if !flow.enabled {
            return Err(FlowEngineError::FlowNotEnabled(flow.code.clone()));
        }
        let data = Arc::new(ExecutionData::with_depth(flow, trigger, depth));
        let span = info_span!(
            "flow_run",
            execution_id = %data.execution_id(),
            flow_code = %data.flow().code,
            depth
        );

        async move {
            info!(version = data.flow().version, "flow run started");
            let started_at = Utc::now();
            let scope = RunScope::new(self.clone(), Arc::clone(&data), cancel.clone());
            let outcome = scope.walk(data.flow().entry().to_vec()).await;

            let cancelled_error = || {
                cancel
                    .reason()
                    .map_or(FlowEngineError::Cancelled, FlowEngineError::from)
            };
            let (status, error) = match outcome.error {
                _ if outcome.cancelled => (RunStatus::Cancelled, Some(cancelled_error())),
                Some(FlowEngineError::Cancelled) if cancel.is_cancelled() => {
                    (RunStatus::Cancelled, Some(cancelled_error()))
                }
                Some(err) => (RunStatus::Failed, Some(err)),
                None => (RunStatus::Completed, None),
            };

            match &error {
                None => info!(rows = outcome.rows.len(), "flow run completed"),
                Some(err) => warn!(?status, error = %err, "flow run did not complete"),
            }

            let trace = RunTrace::capture(
                &data,
                status,
                started_at,
                outcome.rows,
                error.as_ref().map(ToString::to_string),
            );
            Ok(FlowExecution {
                execution_id: data.execution_id().to_string(),
                flow_code: data.flow().code.clone(),
                status,
                output: data.output(),
                end_node_id: data.end_node(),
                error,
                trace,
                archive: None,
            })
        }
        .instrument(span)
        .await
    }
}
