//! ============================================================================
//! History Module - Ordered per-identity conversation logs
//! ============================================================================
//! `HistoryBackend` is the ordered-log contract the store is written
//! against; `HistoryDb` (redb) is the bundled implementation.
//! `HistoryStore` layers identity validation, scoring, windowing and
//! seeding on top.
//! ============================================================================

mod store;

pub use store::{now_millis, HistoryStore, DEFAULT_DELIMITER};

use anyhow::Result;
use async_trait::async_trait;

use crate::db::{HistoryDb, HistoryRecord};

/// Ordered log store: scored members per key, read back ascending by score
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Whether a log exists for `key`
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Append one member with `score`. Equal scores keep insertion order.
    async fn append_scored(&self, key: &str, score: i64, record: HistoryRecord) -> Result<()>;

    /// Members with score in [min, max], ascending
    async fn range_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>>;

    /// Write `entries` only when no log exists for `key`.
    /// Returns false when the log was already present.
    ///
    /// The default checks then writes, so two concurrent first calls can
    /// both observe an absent log. Backends with transactions override it.
    async fn seed_if_absent(&self, key: &str, entries: Vec<(i64, HistoryRecord)>) -> Result<bool> {
        if self.exists(key).await? {
            return Ok(false);
        }
        for (score, record) in entries {
            self.append_scored(key, score, record).await?;
        }
        Ok(true)
    }
}

#[async_trait]
impl HistoryBackend for HistoryDb {
    async fn exists(&self, key: &str) -> Result<bool> {
        HistoryDb::exists(self, key)
    }

    async fn append_scored(&self, key: &str, score: i64, record: HistoryRecord) -> Result<()> {
        HistoryDb::append_scored(self, key, score, &record).map(|_| ())
    }

    async fn range_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>> {
        Ok(HistoryDb::range_by_score(self, key, min, max)?
            .into_iter()
            .map(|entry| entry.record.text)
            .collect())
    }

    async fn seed_if_absent(&self, key: &str, entries: Vec<(i64, HistoryRecord)>) -> Result<bool> {
        HistoryDb::seed_if_absent(self, key, &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Backend relying on the default check-then-write seeding
    #[derive(Default)]
    struct MapBackend {
        logs: Mutex<BTreeMap<String, Vec<(i64, String)>>>,
    }

    #[async_trait]
    impl HistoryBackend for MapBackend {
        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.logs.lock().unwrap().contains_key(key))
        }

        async fn append_scored(&self, key: &str, score: i64, record: HistoryRecord) -> Result<()> {
            let mut logs = self.logs.lock().unwrap();
            let log = logs.entry(key.to_string()).or_default();
            // Stable insert keeps equal scores in arrival order
            let pos = log.partition_point(|(s, _)| *s <= score);
            log.insert(pos, (score, record.text));
            Ok(())
        }

        async fn range_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>> {
            Ok(self
                .logs
                .lock()
                .unwrap()
                .get(key)
                .map(|log| {
                    log.iter()
                        .filter(|(s, _)| *s >= min && *s <= max)
                        .map(|(_, t)| t.clone())
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_default_seed_if_absent() {
        let backend = MapBackend::default();
        let entries = vec![
            (0, HistoryRecord::seed("a", 0)),
            (1, HistoryRecord::seed("b", 0)),
        ];

        assert!(backend.seed_if_absent("k", entries.clone()).await.unwrap());
        assert!(!backend.seed_if_absent("k", entries).await.unwrap());
        assert_eq!(
            backend.range_by_score("k", 0, 10).await.unwrap(),
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn test_redb_backend_through_trait() {
        let db = HistoryDb::open_in_memory().unwrap();
        let backend: &dyn HistoryBackend = &db;

        backend
            .append_scored("k", 5, HistoryRecord::live("later", 5))
            .await
            .unwrap();
        assert!(backend
            .seed_if_absent("k", vec![(0, HistoryRecord::seed("ignored", 0))])
            .await
            .map(|seeded| !seeded)
            .unwrap());
        assert_eq!(backend.range_by_score("k", 0, 10).await.unwrap(), vec!["later"]);
    }
}
