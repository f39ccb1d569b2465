//! ============================================================================
//! Recall Engine - Source-scoped semantic search
//! ============================================================================
//! Embeds the recent conversation and asks the index for the closest
//! passages from one content source. Failures never reach the caller's
//! conversation flow: they are logged here and reported as `Degraded`.
//! ============================================================================

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::embeddings::Embedder;
use super::index::PassageIndex;
use crate::types::{MemoryError, RecallOutcome};

/// Semantic recall over a pre-populated passage index
pub struct RecallEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn PassageIndex>,
    top_k: u64,
    source_field: String,
}

impl RecallEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn PassageIndex>,
        top_k: u64,
        source_field: String,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            source_field,
        }
    }

    pub fn top_k(&self) -> u64 {
        self.top_k
    }

    /// Top-K passages tagged `source_id`, closest first
    pub async fn recall(&self, query_text: &str, source_id: &str) -> RecallOutcome {
        if query_text.trim().is_empty() {
            debug!("Empty recall query for {}, nothing to search", source_id);
            return RecallOutcome::Found(Vec::new());
        }

        let vector = match self.embedder.embed_query(query_text).await {
            Ok(vector) => vector,
            Err(e) => {
                let err = MemoryError::Embedding(e.to_string());
                error!("Vector search failed: {}", err);
                return RecallOutcome::Degraded(err.to_string());
            }
        };

        let mut passages = match self.index.query(vector, self.top_k, source_id).await {
            Ok(passages) => passages,
            Err(e) => {
                let err = MemoryError::Index(e.to_string());
                error!("Vector search failed: {}", err);
                return RecallOutcome::Degraded(err.to_string());
            }
        };

        let returned = passages.len();
        passages.retain(|p| p.source_tag(&self.source_field) == Some(source_id));
        if passages.len() < returned {
            warn!(
                "Dropped {} passages not tagged {}",
                returned - passages.len(),
                source_id
            );
        }
        passages.truncate(self.top_k as usize);

        debug!("Recalled {} passages for {}", passages.len(), source_id);
        RecallOutcome::Found(passages)
    }

    pub async fn health_check(&self) -> bool {
        match self.index.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!("Vector index health check failed: {}", e);
                false
            }
        }
    }
}
