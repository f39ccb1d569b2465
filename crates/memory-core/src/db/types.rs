//! ============================================================================
//! Database Types - Serializable records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Value stored for each history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub text: String,
    pub source: EntrySource,
    /// Wall-clock time the entry was written (ms since epoch)
    pub written_at_ms: i64,
}

impl HistoryRecord {
    pub fn live(text: impl Into<String>, written_at_ms: i64) -> Self {
        Self {
            text: text.into(),
            source: EntrySource::Live,
            written_at_ms,
        }
    }

    pub fn seed(text: impl Into<String>, written_at_ms: i64) -> Self {
        Self {
            text: text.into(),
            source: EntrySource::Seed,
            written_at_ms,
        }
    }
}

/// How an entry got into the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Conversation turn, scored by wall-clock milliseconds
    Live,
    /// Bootstrap content, scored by line position
    Seed,
}

/// One entry of a history log as read back from the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub score: i64,
    /// Database-wide insertion sequence, breaks ties between equal scores
    pub seq: u64,
    #[serde(flatten)]
    pub record: HistoryRecord,
}

/// Database statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbStats {
    pub total_logs: usize,
    pub total_entries: usize,
    pub seed_entries: usize,
    pub live_entries: usize,
}
