use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::unit::RetryUnit;
use crate::error::Result;

/// `now - timeout`, clamped to the earliest representable instant.
pub(crate) fn timeout_cutoff(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(timeout).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 重试单元表
#[async_trait]
pub trait RetryUnitStore: Send + Sync {
    async fn insert(&self, unit: RetryUnit) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<RetryUnit>>;
    async fn update(&self, unit: &RetryUnit) -> Result<()>;
    /// Units in `Wait`/`InExecution` whose `updated_at < now - timeout`.
    async fn find_timed_out(&self, timeout: Duration, now: DateTime<Utc>) -> Result<Vec<RetryUnit>>;
}

pub type DynRetryUnitStore = Arc<dyn RetryUnitStore>;

/// 内存实现
#[derive(Default)]
pub struct MemoryRetryStore {
    units: RwLock<HashMap<String, RetryUnit>>,
}

impl MemoryRetryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetryUnitStore for MemoryRetryStore {
    async fn insert(&self, unit: RetryUnit) -> Result<()> {
        self.units.write().insert(unit.id.clone(), unit);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<RetryUnit>> {
        Ok(self.units.read().get(id).cloned())
    }

    async fn update(&self, unit: &RetryUnit) -> Result<()> {
        self.units.write().insert(unit.id.clone(), unit.clone());
        Ok(())
    }

    async fn find_timed_out(&self, timeout: Duration, now: DateTime<Utc>) -> Result<Vec<RetryUnit>> {
        let cutoff = timeout_cutoff(now, timeout);
        let mut units: Vec<_> = self
            .units
            .read()
            .values()
            .filter(|unit| unit.is_timed_out(cutoff))
            .cloned()
            .collect();
        units.sort_by_key(|unit| unit.updated_at);
        Ok(units)
    }
}

#[cfg(feature = "redis-store")]
pub mod redis {
    use super::*;
    use crate::error::FlowEngineError;
    use redis::AsyncCommands;

    /// Redis 实现：每个单元一条 JSON，id 记录在一个 set 中
    pub struct RedisRetryStore {
        client: redis::Client,
        prefix: String,
    }

    impl RedisRetryStore {
        pub fn new(client: redis::Client) -> Self {
            Self {
                client,
                prefix: "flowengine:retry".to_string(),
            }
        }

        pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
            self.prefix = prefix.into();
            self
        }

        fn unit_key(&self, id: &str) -> String {
            format!("{}:unit:{id}", self.prefix)
        }

        fn index_key(&self) -> String {
            format!("{}:units", self.prefix)
        }

        async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| FlowEngineError::Storage(e.to_string()))
        }

        async fn write(&self, unit: &RetryUnit) -> Result<()> {
            let raw = serde_json::to_string(unit)?;
            let mut conn = self.connection().await?;
            conn.set::<_, _, ()>(self.unit_key(&unit.id), raw)
                .await
                .map_err(|e| FlowEngineError::Storage(e.to_string()))?;
            conn.sadd::<_, _, ()>(self.index_key(), &unit.id)
                .await
                .map_err(|e| FlowEngineError::Storage(e.to_string()))?;
            Ok(())
        }
    }

    #[async_trait]
    impl RetryUnitStore for RedisRetryStore {
        async fn insert(&self, unit: RetryUnit) -> Result<()> {
            self.write(&unit).await
        }

        async fn get(&self, id: &str) -> Result<Option<RetryUnit>> {
            let mut conn = self.connection().await?;
            let raw: Option<String> = conn
                .get(self.unit_key(id))
                .await
                .map_err(|e| FlowEngineError::Storage(e.to_string()))?;
            raw.map(|raw| serde_json::from_str(&raw).map_err(FlowEngineError::from))
                .transpose()
        }

        async fn update(&self, unit: &RetryUnit) -> Result<()> {
            self.write(unit).await
        }

        async fn find_timed_out(
            &self,
            timeout: Duration,
            now: DateTime<Utc>,
        ) -> Result<Vec<RetryUnit>> {
            let mut conn = self.connection().await?;
            let ids: Vec<String> = conn
                .smembers(self.index_key())
                .await
                .map_err(|e| FlowEngineError::Storage(e.to_string()))?;
            let cutoff = timeout_cutoff(now, timeout);
            let mut units = Vec::new();
            for id in ids {
                if let Some(unit) = self.get(&id).await? {
                    if unit.is_timed_out(cutoff) {
                        units.push(unit);
                    }
                }
            }
            units.sort_by_key(|unit| unit.updated_at);
            Ok(units)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::UnitStatus;
    use serde_json::json;

    #[tokio::test]
    async fn unbounded_timeout_finds_nothing() {
        let store = MemoryRetryStore::new();
        let mut ancient = RetryUnit::new(json!({}));
        ancient.updated_at = DateTime::<Utc>::MIN_UTC;
        store.insert(ancient).await.unwrap();

        let found = store.find_timed_out(Duration::MAX, Utc::now()).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn only_stale_active_units_time_out() {
        let store = MemoryRetryStore::new();
        let now = Utc::now();

        let mut stale = RetryUnit::new(json!({}));
        stale.updated_at = now - Duration::seconds(600);
        let mut done = stale.clone();
        done.id = "done".into();
        done.status = UnitStatus::Completed;
        let fresh = RetryUnit::new(json!({}));

        store.insert(stale.clone()).await.unwrap();
        store.insert(done).await.unwrap();
        store.insert(fresh).await.unwrap();

        let found = store
            .find_timed_out(Duration::seconds(300), now)
            .await
            .unwrap();
        assert_eq!(found, vec![stale]);
    }
}
