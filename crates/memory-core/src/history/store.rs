//! ============================================================================
//! History Store - Append, recent-window read and idempotent seeding
//! ============================================================================
//! Live turns are scored by wall-clock milliseconds; seeded lines are scored
//! by their position (0, 1, 2, ...). Any realistic epoch millisecond is far
//! larger than a backstory's line count, so seeded content always reads back
//! before live turns.
//! ============================================================================

use std::sync::Arc;

use tracing::{debug, info};

use super::HistoryBackend;
use crate::db::HistoryRecord;
use crate::types::{CompanionKey, MemoryError};

/// Line delimiter used when seeding without an explicit one
pub const DEFAULT_DELIMITER: &str = "\n";

/// Current wall-clock time in milliseconds since epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Identity-keyed history logs over a [`HistoryBackend`]
pub struct HistoryStore {
    backend: Arc<dyn HistoryBackend>,
    window: usize,
}

impl HistoryStore {
    /// `window` is the number of most recent entries returned by reads
    pub fn new(backend: Arc<dyn HistoryBackend>, window: usize) -> Self {
        Self { backend, window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Append `text` scored by the current time. Returns the score used.
    pub async fn append(&self, key: &CompanionKey, text: &str) -> Result<i64, MemoryError> {
        key.validate()?;
        let storage_key = key.derive_key();
        let score = now_millis();

        self.backend
            .append_scored(&storage_key, score, HistoryRecord::live(text, score))
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;

        debug!("Appended turn for {} (score: {})", key, score);
        Ok(score)
    }

    /// The most recent `window` entries scored in [0, now], oldest first
    pub async fn read_recent(&self, key: &CompanionKey) -> Result<Vec<String>, MemoryError> {
        key.validate()?;
        let storage_key = key.derive_key();

        let mut lines = self
            .backend
            .range_by_score(&storage_key, 0, now_millis())
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;

        if lines.len() > self.window {
            lines.drain(..lines.len() - self.window);
        }

        debug!("Read {} recent entries for {}", lines.len(), key);
        Ok(lines)
    }

    /// Seed an absent log with `content` split on `delimiter`.
    ///
    /// Returns `Some(lines)` when seeded, `None` when the log already existed.
    /// An empty delimiter falls back to [`DEFAULT_DELIMITER`].
    pub async fn seed(
        &self,
        key: &CompanionKey,
        content: &str,
        delimiter: &str,
    ) -> Result<Option<usize>, MemoryError> {
        key.validate()?;
        let storage_key = key.derive_key();
        let delimiter = if delimiter.is_empty() {
            DEFAULT_DELIMITER
        } else {
            delimiter
        };

        let written_at = now_millis();
        let entries: Vec<(i64, HistoryRecord)> = content
            .split(delimiter)
            .enumerate()
            .map(|(i, line)| (i as i64, HistoryRecord::seed(line, written_at)))
            .collect();
        let count = entries.len();

        let seeded = self
            .backend
            .seed_if_absent(&storage_key, entries)
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;

        if seeded {
            info!("Seeded {} history lines for {}", count, key);
            Ok(Some(count))
        } else {
            info!("User already has chat history: {}", key);
            Ok(None)
        }
    }
}
