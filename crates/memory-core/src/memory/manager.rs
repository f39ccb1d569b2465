//! ============================================================================
//! Memory Manager - Caller-facing history and recall API
//! ============================================================================
//! Composes the history store and the recall engine. Recoverable failures
//! (bad identity, store hiccups, unreachable index) are logged here and
//! returned as explicit outcomes; only construction can fail outright.
//! ============================================================================

use std::sync::Arc;

use tracing::{error, info};

use super::embeddings::EmbeddingService;
use super::index::QdrantPassageIndex;
use super::lifecycle;
use super::recall::RecallEngine;
use crate::config::MemoryConfig;
use crate::db::HistoryDb;
use crate::history::HistoryStore;
use crate::types::{CompanionKey, MemoryError, Passage, RecallOutcome, SeedOutcome, WriteOutcome};

/// Memory manager combining history logs and semantic recall
pub struct MemoryManager {
    history: HistoryStore,
    recall: RecallEngine,
}

impl MemoryManager {
    /// Open the history database and configure the embedding and vector
    /// index clients. Any failure here is fatal to the caller.
    pub async fn new(config: MemoryConfig) -> Result<Self, MemoryError> {
        let db = HistoryDb::open(config.history_db_path.as_deref())
            .map_err(|e| MemoryError::Storage(e.to_string()))?;

        let index = QdrantPassageIndex::from_config(&config).map_err(|e| {
            error!("Vector index initialization failed: {}", e);
            MemoryError::Index(e.to_string())
        })?;
        info!("Vector index client configured for {}", index.collection());

        let embeddings = EmbeddingService::from_config(&config);

        let manager = Self::from_parts(
            HistoryStore::new(Arc::new(db), config.recent_window),
            RecallEngine::new(
                Arc::new(embeddings),
                Arc::new(index),
                config.recall_top_k,
                config.source_field.clone(),
            ),
        );

        info!(
            "Memory manager ready (window: {}, top_k: {})",
            manager.history.window(),
            manager.recall.top_k()
        );
        Ok(manager)
    }

    /// Build from the process environment
    pub async fn from_env() -> Result<Self, MemoryError> {
        Self::new(MemoryConfig::from_env()?).await
    }

    /// Assemble from already-constructed parts
    pub fn from_parts(history: HistoryStore, recall: RecallEngine) -> Self {
        Self { history, recall }
    }

    /// The process-wide shared manager, built from the environment on first
    /// use. Concurrent first calls share one initialization.
    pub async fn get_instance() -> Result<Arc<MemoryManager>, MemoryError> {
        lifecycle::get_instance().await
    }

    /// Append a conversation turn scored by the current time
    pub async fn write_to_history(&self, text: &str, key: &CompanionKey) -> WriteOutcome {
        match self.history.append(key, text).await {
            Ok(score) => WriteOutcome::Appended { score },
            Err(e @ MemoryError::InvalidIdentity(_)) => {
                error!("{}", e);
                WriteOutcome::Rejected(e.to_string())
            }
            Err(e) => {
                error!("Failed to write history for {}: {}", key, e);
                WriteOutcome::Degraded(e.to_string())
            }
        }
    }

    /// The most recent turns, oldest first, newline-joined.
    /// Empty when there is no history or it could not be read.
    pub async fn read_latest_history(&self, key: &CompanionKey) -> String {
        match self.history.read_recent(key).await {
            Ok(lines) => lines.join("\n"),
            Err(e @ MemoryError::InvalidIdentity(_)) => {
                error!("{}", e);
                String::new()
            }
            Err(e) => {
                error!("Failed to read history for {}: {}", key, e);
                String::new()
            }
        }
    }

    /// Seed an identity's log with backstory content, once
    pub async fn seed_chat_history(
        &self,
        content: &str,
        delimiter: &str,
        key: &CompanionKey,
    ) -> SeedOutcome {
        match self.history.seed(key, content, delimiter).await {
            Ok(Some(lines)) => SeedOutcome::Seeded { lines },
            Ok(None) => SeedOutcome::AlreadyPresent,
            Err(e @ MemoryError::InvalidIdentity(_)) => {
                error!("{}", e);
                SeedOutcome::Rejected(e.to_string())
            }
            Err(e) => {
                error!("Failed to seed history for {}: {}", key, e);
                SeedOutcome::Degraded(e.to_string())
            }
        }
    }

    /// Passages relevant to the recent conversation from one source.
    /// Empty on failure; see [`MemoryManager::recall`] to tell the two apart.
    pub async fn vector_search(&self, recent_chat_history: &str, source_id: &str) -> Vec<Passage> {
        self.recall(recent_chat_history, source_id)
            .await
            .into_passages()
    }

    pub async fn recall(&self, recent_chat_history: &str, source_id: &str) -> RecallOutcome {
        self.recall.recall(recent_chat_history, source_id).await
    }

    /// Check if the vector index is reachable
    pub async fn index_health_check(&self) -> bool {
        self.recall.health_check().await
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }
}
