use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::unit::RetryUnit;
use crate::error::{FlowEngineError, Result};
use crate::runtime::FlowExecutor;
use crate::state::{TriggerData, TriggerType};

/// 重试单元背后的实际动作
#[async_trait]
pub trait UnitAction: Send + Sync {
    async fn execute(&self, unit: &RetryUnit) -> Result<()>;
}

pub type DynUnitAction = Arc<dyn UnitAction>;

struct FnAction<F> {
    action: F,
}

#[async_trait]
impl<F, Fut> UnitAction for FnAction<F>
where
    F: Fn(RetryUnit) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn execute(&self, unit: &RetryUnit) -> Result<()> {
        (self.action)(unit.clone()).await
    }
}

/// Wraps an async closure as a [`UnitAction`].
pub fn action_from_fn<F, Fut>(action: F) -> DynUnitAction
where
    F: Fn(RetryUnit) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnAction { action })
}

/// 延迟执行的 Flow 运行描述
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeferredRunPayload {
    pub flow_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_version: Option<u32>,
    #[serde(default)]
    pub organization_code: Option<String>,
    #[serde(default)]
    pub trigger: Option<TriggerData>,
}

/// Runs a published flow described by a [`DeferredRunPayload`]; anything
/// short of `Completed` counts as a failed attempt.
pub struct DeferredRunAction {
    executor: FlowExecutor,
}

impl DeferredRunAction {
    pub fn new(executor: FlowExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl UnitAction for DeferredRunAction {
    async fn execute(&self, unit: &RetryUnit) -> Result<()> {
        let payload: DeferredRunPayload = serde_json::from_value(unit.payload.clone())?;
        let mut trigger = payload
            .trigger
            .unwrap_or_else(|| TriggerData::new(TriggerType::Retry, serde_json::json!({})));
        if let Some(organization) = payload.organization_code {
            trigger.organization_code = Some(organization);
        }

        let execution = self
            .executor
            .run_published(&payload.flow_code, payload.flow_version, trigger)
            .await?;
        if execution.is_completed() {
            return Ok(());
        }
        let status = execution.status;
        Err(execution.error.unwrap_or_else(|| {
            FlowEngineError::Other(anyhow::anyhow!(
                "flow `{}` ended {status:?}",
                payload.flow_code
            ))
        }))
    }
}
