use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::CounterStore;
use crate::error::StoreError;
use crate::models::CounterRecord;

// In-process counter store, nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, CounterRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str) -> Option<CounterRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.records.get(key).map_or(0, |r| r.views))
    }

    async fn increment_and_read(&self, key: &str) -> Result<u64, StoreError> {
        let now = Utc::now();
        let record = self
            .records
            .entry(key.to_string())
            .and_modify(|r| {
                r.views += 1;
                r.last_viewed_at = now;
            })
            .or_insert_with(|| CounterRecord {
                key: key.to_string(),
                views: 1,
                last_viewed_at: now,
            });
        Ok(record.views)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn absent_key_reads_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.read("blog:nothing").await.unwrap(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn increment_upserts_and_touches_timestamp() {
        let store = MemoryStore::new();
        assert_eq!(store.increment_and_read("blog:a").await.unwrap(), 1);
        let first = store.record("blog:a").unwrap();

        assert_eq!(store.increment_and_read("blog:a").await.unwrap(), 2);
        let second = store.record("blog:a").unwrap();

        assert_eq!(second.views, 2);
        assert!(second.last_viewed_at >= first.last_viewed_at);
        assert_eq!(store.read("blog:a").await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..200 {
            let store = Arc::clone(&store);
            tasks.spawn(async move { store.increment_and_read("blog:hot").await.unwrap() });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
        assert_eq!(store.read("blog:hot").await.unwrap(), 200);
    }
}
