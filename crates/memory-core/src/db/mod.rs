// ============================================================================
// HistoryDb - Embedded Ordered-Log Store (redb)
// ============================================================================
// Persistent storage for per-identity conversation history.
// Default path: ~/.companion/memory.redb (override via MEMORY_DB_PATH)
//
// Entries live in one table keyed by (storage key, score, seq). redb keeps
// tuple keys sorted, so a range over one storage key yields that log in
// ascending score order with insertion order breaking ties.
// ============================================================================

pub mod types;

pub use types::{DbStats, EntrySource, HistoryRecord, LogEntry};

use anyhow::{anyhow, Result};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Table definitions
const HISTORY: TableDefinition<(&str, i64, u64), &[u8]> = TableDefinition::new("history");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_SEQ: &str = "next_seq";

/// Embedded database holding every history log
pub struct HistoryDb {
    db: Database,
    path: Option<PathBuf>,
}

impl HistoryDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses ~/.companion/memory.redb
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let home =
                    dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
                home.join(".companion").join("memory.redb")
            }
        };

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow!("Failed to create {}: {}", parent.display(), e)
                })?;
            }
        }

        info!("Opening history database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        Self::init(db, Some(db_path))
    }

    /// Open a throwaway database that lives only in memory
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?;

        Self::init(db, None)
    }

    fn init(db: Database, path: Option<PathBuf>) -> Result<Self> {
        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(HISTORY)
                .map_err(|e| anyhow!("Failed to create history table: {}", e))?;
            let _ = write_txn
                .open_table(META)
                .map_err(|e| anyhow!("Failed to create meta table: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        debug!("History database ready");

        Ok(Self { db, path })
    }

    /// Get the database file path (None for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========================================================================
    // Log Operations
    // ========================================================================

    /// Whether any entry exists under `key`
    pub fn exists(&self, key: &str) -> Result<bool> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(HISTORY)
            .map_err(|e| anyhow!("Failed to open history table: {}", e))?;

        let mut iter = table
            .range((key, i64::MIN, 0u64)..=(key, i64::MAX, u64::MAX))
            .map_err(|e| anyhow!("Failed to iterate history: {}", e))?;

        let found = match iter.next() {
            Some(entry) => {
                entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
                true
            }
            None => false,
        };
        Ok(found)
    }

    /// Append one scored record. Returns its insertion sequence.
    pub fn append_scored(&self, key: &str, score: i64, record: &HistoryRecord) -> Result<u64> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let seq = insert_entries(&write_txn, key, &[(score, record.clone())])?;
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Appended entry to {} (score: {}, seq: {})", key, score, seq);
        Ok(seq)
    }

    /// Write `entries` only if `key` has no log yet, as one transaction.
    /// Returns false (and writes nothing) when the log already exists.
    pub fn seed_if_absent(&self, key: &str, entries: &[(i64, HistoryRecord)]) -> Result<bool> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;

        let present = {
            let table = write_txn
                .open_table(HISTORY)
                .map_err(|e| anyhow!("Failed to open history table: {}", e))?;
            let mut iter = table
                .range((key, i64::MIN, 0u64)..=(key, i64::MAX, u64::MAX))
                .map_err(|e| anyhow!("Failed to iterate history: {}", e))?;
            let found = iter.next().is_some();
            found
        };

        if present {
            write_txn
                .abort()
                .map_err(|e| anyhow!("Failed to abort: {}", e))?;
            return Ok(false);
        }

        insert_entries(&write_txn, key, entries)?;
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Seeded {} entries into {}", entries.len(), key);
        Ok(true)
    }

    /// Entries of `key` with score in [min, max], ascending by (score, seq)
    pub fn range_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<LogEntry>> {
        if min > max {
            return Ok(Vec::new());
        }

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(HISTORY)
            .map_err(|e| anyhow!("Failed to open history table: {}", e))?;

        let mut results = Vec::new();
        let iter = table
            .range((key, min, 0u64)..=(key, max, u64::MAX))
            .map_err(|e| anyhow!("Failed to iterate history: {}", e))?;
        for entry in iter {
            let (k, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let (_, score, seq) = k.value();
            let record: HistoryRecord = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize entry: {}", e))?;
            results.push(LogEntry { score, seq, record });
        }
        Ok(results)
    }

    /// Every entry of `key`
    pub fn entries(&self, key: &str) -> Result<Vec<LogEntry>> {
        self.range_by_score(key, i64::MIN, i64::MAX)
    }

    // ========================================================================
    // Delete Operations
    // ========================================================================

    /// Remove a whole log. Returns the number of entries removed.
    pub fn delete_log(&self, key: &str) -> Result<usize> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed;
        {
            let mut table = write_txn
                .open_table(HISTORY)
                .map_err(|e| anyhow!("Failed to open history table: {}", e))?;

            let mut doomed = Vec::new();
            for entry in table
                .range((key, i64::MIN, 0u64)..=(key, i64::MAX, u64::MAX))
                .map_err(|e| anyhow!("Failed to iterate history: {}", e))?
            {
                let (k, _) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
                let (_, score, seq) = k.value();
                doomed.push((score, seq));
            }

            for (score, seq) in &doomed {
                table
                    .remove((key, *score, *seq))
                    .map_err(|e| anyhow!("Failed to remove entry: {}", e))?;
            }
            removed = doomed.len();
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

        if removed > 0 {
            info!("Deleted {} entries from {}", removed, key);
        }
        Ok(removed)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<DbStats> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(HISTORY)
            .map_err(|e| anyhow!("Failed to open history table: {}", e))?;

        let mut stats = DbStats::default();
        let mut last_key: Option<String> = None;

        for entry in table
            .range::<(&str, i64, u64)>(..)
            .map_err(|e| anyhow!("Failed to iterate history: {}", e))?
        {
            let (k, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let (key, _, _) = k.value();
            if last_key.as_deref() != Some(key) {
                stats.total_logs += 1;
                last_key = Some(key.to_string());
            }

            let record: HistoryRecord = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize entry: {}", e))?;
            stats.total_entries += 1;
            match record.source {
                EntrySource::Seed => stats.seed_entries += 1,
                EntrySource::Live => stats.live_entries += 1,
            }
        }

        Ok(stats)
    }
}

/// Insert scored records inside an open write transaction.
/// Returns the sequence assigned to the last record.
fn insert_entries(
    write_txn: &WriteTransaction,
    key: &str,
    entries: &[(i64, HistoryRecord)],
) -> Result<u64> {
    let mut meta = write_txn
        .open_table(META)
        .map_err(|e| anyhow!("Failed to open meta table: {}", e))?;
    let mut table = write_txn
        .open_table(HISTORY)
        .map_err(|e| anyhow!("Failed to open history table: {}", e))?;

    let mut seq = meta
        .get(NEXT_SEQ)
        .map_err(|e| anyhow!("Failed to read sequence: {}", e))?
        .map(|v| v.value())
        .unwrap_or(0);
    let mut last = seq;

    for (score, record) in entries {
        let value = bincode::serialize(record)
            .map_err(|e| anyhow!("Failed to serialize entry: {}", e))?;
        table
            .insert((key, *score, seq), value.as_slice())
            .map_err(|e| anyhow!("Failed to insert entry: {}", e))?;
        last = seq;
        seq += 1;
    }

    meta.insert(NEXT_SEQ, seq)
        .map_err(|e| anyhow!("Failed to store sequence: {}", e))?;

    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(text: &str) -> HistoryRecord {
        HistoryRecord::live(text, 0)
    }

    #[test]
    fn test_append_and_range() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.append_scored("k", 20, &live("second")).unwrap();
        db.append_scored("k", 10, &live("first")).unwrap();
        db.append_scored("other", 15, &live("elsewhere")).unwrap();

        let entries = db.range_by_score("k", 0, 100).unwrap();
        let texts: Vec<_> = entries.iter().map(|e| e.record.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let db = HistoryDb::open_in_memory().unwrap();
        for text in ["a", "b", "c"] {
            db.append_scored("k", 42, &live(text)).unwrap();
        }

        let texts: Vec<_> = db
            .entries("k")
            .unwrap()
            .into_iter()
            .map(|e| e.record.text)
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let db = HistoryDb::open_in_memory().unwrap();
        for score in [0, 5, 10, 15] {
            db.append_scored("k", score, &live(&score.to_string())).unwrap();
        }

        let scores: Vec<_> = db
            .range_by_score("k", 5, 10)
            .unwrap()
            .into_iter()
            .map(|e| e.score)
            .collect();
        assert_eq!(scores, vec![5, 10]);
        assert!(db.range_by_score("k", 10, 5).unwrap().is_empty());
    }

    #[test]
    fn test_prefix_keys_do_not_bleed() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.append_scored("abc", 1, &live("long")).unwrap();

        assert!(!db.exists("ab").unwrap());
        assert!(db.exists("abc").unwrap());
        assert!(db.entries("ab").unwrap().is_empty());
    }

    #[test]
    fn test_seed_if_absent() {
        let db = HistoryDb::open_in_memory().unwrap();
        let seed = vec![
            (0, HistoryRecord::seed("Hello", 0)),
            (1, HistoryRecord::seed("Hi there", 0)),
        ];

        assert!(db.seed_if_absent("k", &seed).unwrap());
        assert!(!db.seed_if_absent("k", &[(0, HistoryRecord::seed("again", 0))]).unwrap());

        let entries = db.entries("k").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].score, 0);
        assert_eq!(entries[1].record.text, "Hi there");
        assert_eq!(entries[1].record.source, EntrySource::Seed);
    }

    #[test]
    fn test_delete_log_and_stats() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.seed_if_absent("a", &[(0, HistoryRecord::seed("backstory", 0))])
            .unwrap();
        db.append_scored("a", 1_700_000_000_000, &live("hi")).unwrap();
        db.append_scored("b", 1_700_000_000_001, &live("yo")).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_logs, 2);
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.seed_entries, 1);
        assert_eq!(stats.live_entries, 2);

        assert_eq!(db.delete_log("a").unwrap(), 2);
        assert!(!db.exists("a").unwrap());
        assert!(db.exists("b").unwrap());
        assert_eq!(db.delete_log("a").unwrap(), 0);
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.redb");

        {
            let db = HistoryDb::open(Some(&path)).unwrap();
            assert_eq!(db.path(), Some(path.as_path()));
            db.append_scored("k", 1, &live("kept")).unwrap();
        }

        let db = HistoryDb::open(Some(&path)).unwrap();
        assert_eq!(db.entries("k").unwrap()[0].record.text, "kept");
    }
}
