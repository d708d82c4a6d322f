use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{FlowEngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::flow::types::Flow;
use crate::flow::validation::validate_flow;
use crate::runner::RunnerRegistry;

/// Flow 定义存储
///
/// Published versions are frozen; editing happens on the single draft per
/// flow code and a new version is cut by [`FlowRepository::publish`].
#[async_trait]
pub trait FlowRepository: Send + Sync {
    /// `None` loads the latest published version.
    async fn load_flow(&self, code: &str, version: Option<u32>) -> Result<Arc<Flow>>;

    async fn save_draft(&self, flow: Flow) -> Result<()>;

    /// Validates the draft and freezes it as the next version.
    async fn publish(&self, code: &str, registry: &RunnerRegistry) -> Result<Arc<Flow>>;

    async fn set_enabled(&self, code: &str, enabled: bool) -> Result<()>;
}

pub type DynFlowRepository = Arc<dyn FlowRepository>;

struct FlowRecord {
    draft: Option<Flow>,
    published: BTreeMap<u32, Arc<Flow>>,
    enabled: bool,
}

impl FlowRecord {
    fn latest(&self) -> Option<&Arc<Flow>> {
        self.published.values().next_back()
    }
}

/// 内存中的 Flow 存储
#[derive(Default)]
pub struct MemoryFlowRepository {
    flows: RwLock<HashMap<String, FlowRecord>>,
    events: Option<EventBus>,
}

impl MemoryFlowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Published version numbers of `code`, ascending.
    pub fn versions(&self, code: &str) -> Vec<u32> {
        self.flows
            .read()
            .get(code)
            .map(|record| record.published.keys().copied().collect())
            .unwrap_or_default()
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

/// Definition JSON with the fields that publishing owns blanked out.
fn comparable(flow: &Flow) -> Result<Value> {
    let mut definition = flow.definition();
    definition.version = 0;
    definition.enabled = true;
    Ok(serde_json::to_value(definition)?)
}

#[async_trait]
impl FlowRepository for MemoryFlowRepository {
    async fn load_flow(&self, code: &str, version: Option<u32>) -> Result<Arc<Flow>> {
        let flows = self.flows.read();
        let record = flows.get(code);
        let found = match version {
            Some(version) => record.and_then(|r| r.published.get(&version)),
            None => record.and_then(FlowRecord::latest),
        };
        found.map(Arc::clone).ok_or_else(|| FlowEngineError::FlowNotFound {
            code: code.to_string(),
            version,
        })
    }

    async fn save_draft(&self, flow: Flow) -> Result<()> {
        let code = flow.code.clone();
        {
            let mut flows = self.flows.write();
            let record = flows.entry(code.clone()).or_insert_with(|| FlowRecord {
                draft: None,
                published: BTreeMap::new(),
                enabled: flow.enabled,
            });
            record.draft = Some(flow);
        }
        debug!(flow = %code, "draft saved");
        self.emit(EngineEvent::FlowSaved { code });
        Ok(())
    }

    async fn publish(&self, code: &str, registry: &RunnerRegistry) -> Result<Arc<Flow>> {
        let published = {
            let mut flows = self.flows.write();
            let record = flows
                .get_mut(code)
                .ok_or_else(|| FlowEngineError::FlowNotFound {
                    code: code.to_string(),
                    version: None,
                })?;
            let draft = record
                .draft
                .as_ref()
                .ok_or_else(|| FlowEngineError::FlowNotFound {
                    code: code.to_string(),
                    version: None,
                })?;

            if let Some(latest) = record.latest() {
                if comparable(latest)? == comparable(draft)? {
                    return Err(FlowEngineError::FlowAlreadyPublished {
                        code: code.to_string(),
                        version: latest.version,
                    });
                }
            }
            validate_flow(draft, registry)?;

            let version = record.latest().map_or(1, |latest| latest.version + 1);
            let mut frozen = draft.clone().with_version(version);
            frozen.set_enabled(record.enabled);
            let frozen = Arc::new(frozen);
            record.published.insert(version, Arc::clone(&frozen));
            frozen
        };

        info!(flow = %code, version = published.version, "flow published");
        self.emit(EngineEvent::FlowPublished {
            code: code.to_string(),
            version: published.version,
        });
        Ok(published)
    }

    async fn set_enabled(&self, code: &str, enabled: bool) -> Result<()> {
        {
            let mut flows = self.flows.write();
            let record = flows
                .get_mut(code)
                .ok_or_else(|| FlowEngineError::FlowNotFound {
                    code: code.to_string(),
                    version: None,
                })?;
            record.enabled = enabled;
            // Runs holding the old Arc keep their snapshot.
            for flow in record.published.values_mut() {
                let mut toggled = Flow::clone(flow);
                toggled.set_enabled(enabled);
                *flow = Arc::new(toggled);
            }
            if let Some(draft) = record.draft.as_mut() {
                draft.set_enabled(enabled);
            }
        }
        info!(flow = %code, enabled, "flow enabled changed");
        self.emit(EngineEvent::FlowEnabledChanged {
            code: code.to_string(),
            enabled,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowBuilder, Node};
    use crate::runner::RunnerServices;

    fn registry() -> RunnerRegistry {
        RunnerRegistry::with_builtins(RunnerServices::default())
    }

    fn draft(name: &str) -> Flow {
        FlowBuilder::new("greet")
            .name(name)
            .start("start")
            .end("end")
            .connect("start", "end")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn publishing_cuts_new_versions() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let repo = MemoryFlowRepository::new().with_events(events);

        repo.save_draft(draft("one")).await.unwrap();
        assert!(repo.load_flow("greet", None).await.is_err());
        assert_eq!(repo.publish("greet", &registry()).await.unwrap().version, 1);

        let err = repo.publish("greet", &registry()).await.unwrap_err();
        assert!(matches!(err, FlowEngineError::FlowAlreadyPublished { version: 1, .. }));

        repo.save_draft(draft("two")).await.unwrap();
        repo.publish("greet", &registry()).await.unwrap();
        assert_eq!(repo.versions("greet"), vec![1, 2]);
        assert_eq!(repo.load_flow("greet", Some(1)).await.unwrap().name, "one");
        assert_eq!(repo.load_flow("greet", None).await.unwrap().name, "two");

        assert_eq!(rx.recv().await.unwrap(), EngineEvent::FlowSaved { code: "greet".into() });
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::FlowPublished { version: 1, .. }));
    }

    #[tokio::test]
    async fn invalid_draft_is_not_published() {
        let repo = MemoryFlowRepository::new();
        let flow = FlowBuilder::new("bad")
            .start("start")
            .node(Node::new("x", "mystery"))
            .connect("start", "x")
            .build()
            .unwrap();
        repo.save_draft(flow).await.unwrap();
        let err = repo.publish("bad", &registry()).await.unwrap_err();
        assert!(err.is_definition_error());
        assert!(repo.versions("bad").is_empty());
    }

    #[tokio::test]
    async fn disabling_keeps_old_snapshots() {
        let repo = MemoryFlowRepository::new();
        repo.save_draft(draft("one")).await.unwrap();
        repo.publish("greet", &registry()).await.unwrap();
        let before = repo.load_flow("greet", None).await.unwrap();

        repo.set_enabled("greet", false).await.unwrap();
        assert!(before.enabled);
        assert!(!repo.load_flow("greet", Some(1)).await.unwrap().enabled);
        assert!(repo.set_enabled("ghost", true).await.is_err());
    }
}
