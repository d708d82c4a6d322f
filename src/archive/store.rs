use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::{object_key, DynObjectStorage};
use crate::config::ArchiveConfig;
use crate::error::Result;
use crate::trace::RunTrace;

/// 归档结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchiveRecord {
    /// Kept in the archive's own memory until evicted or the process exits.
    Inline { key: String },
    /// Written to object storage under `key`.
    Stored { key: String },
    /// Over the size ceiling; nothing was written.
    Dropped,
}

impl ArchiveRecord {
    /// Empty for dropped traces.
    pub fn reference(&self) -> &str {
        match self {
            ArchiveRecord::Inline { key } | ArchiveRecord::Stored { key } => key,
            ArchiveRecord::Dropped => "",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reference().is_empty()
    }
}

type InlineKey = (String, String);

/// Inline traces in insertion order, capped at `capacity` entries.
#[derive(Default)]
struct InlineTraces {
    entries: HashMap<InlineKey, Vec<u8>>,
    order: VecDeque<InlineKey>,
}

impl InlineTraces {
    fn insert(&mut self, key: InlineKey, bytes: Vec<u8>, capacity: usize) {
        if self.entries.insert(key.clone(), bytes).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            debug!(execution_id = %oldest.1, "inline trace evicted");
        }
    }
}

/// 执行归档
///
/// Small traces stay inline, larger ones go through a temporary file to
/// object storage, and anything over `max_size_bytes` is dropped. Inline
/// traces are bounded by `inline_capacity` and never reach storage, so an
/// evicted or restarted archive no longer returns them.
pub struct ExecutionArchive {
    storage: DynObjectStorage,
    config: ArchiveConfig,
    inline: Mutex<InlineTraces>,
}

impl ExecutionArchive {
    pub fn new(storage: DynObjectStorage, config: ArchiveConfig) -> Self {
        Self {
            storage,
            config,
            inline: Mutex::new(InlineTraces::default()),
        }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub async fn put(
        &self,
        organization_code: &str,
        execution_id: &str,
        trace: &RunTrace,
    ) -> Result<ArchiveRecord> {
        let bytes = trace.to_bytes()?;
        if bytes.len() > self.config.max_size_bytes {
            warn!(
                execution_id = %execution_id,
                size = bytes.len(),
                limit = self.config.max_size_bytes,
                "trace exceeds archive ceiling; dropped"
            );
            return Ok(ArchiveRecord::Dropped);
        }

        if self.config.inline_capacity > 0 && bytes.len() <= self.config.inline_limit_bytes {
            self.inline.lock().insert(
                (organization_code.to_string(), execution_id.to_string()),
                bytes,
                self.config.inline_capacity,
            );
            debug!(execution_id = %execution_id, "trace archived inline");
            return Ok(ArchiveRecord::Inline {
                key: execution_id.to_string(),
            });
        }

        // The directory is removed when `staging` drops, whatever happens below.
        let staging = tempfile::tempdir()?;
        let path = staging.path().join(format!("{execution_id}.json"));
        tokio::fs::write(&path, &bytes).await?;
        let key = self
            .storage
            .upload(organization_code, &path, &self.config.directory_hint)
            .await?;
        debug!(execution_id = %execution_id, key = %key, size = bytes.len(), "trace uploaded");
        Ok(ArchiveRecord::Stored { key })
    }

    pub async fn get(&self, organization_code: &str, execution_id: &str) -> Result<RunTrace> {
        let inline = self
            .inline
            .lock()
            .entries
            .get(&(organization_code.to_string(), execution_id.to_string()))
            .cloned();
        if let Some(bytes) = inline {
            return RunTrace::from_bytes(&bytes);
        }
        let key = object_key(
            &self.config.directory_hint,
            organization_code,
            &format!("{execution_id}.json"),
        );
        let bytes = self.storage.fetch(organization_code, &key).await?;
        RunTrace::from_bytes(&bytes)
    }
}
