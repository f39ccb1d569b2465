//! ============================================================================
//! MEMORY-CORE: Companion Conversation Memory
//! ============================================================================
//! Per-conversation memory for chat companions:
//! - Identity keying for (companion, model, user) conversations
//! - Ordered history logs on an embedded redb database
//! - Idempotent backstory seeding
//! - Source-scoped semantic recall via embeddings + Qdrant
//! - One shared manager per process
//! ============================================================================

pub mod config;
pub mod db;
pub mod history;
pub mod memory;
pub mod types;

// Re-export main types for convenience
pub use config::MemoryConfig;
pub use db::{DbStats, EntrySource, HistoryDb, HistoryRecord, LogEntry};
pub use history::{HistoryBackend, HistoryStore, DEFAULT_DELIMITER};
pub use memory::{
    get_instance, Embedder, EmbeddingService, ManagerCell, MemoryManager, PassageIndex,
    QdrantPassageIndex, RecallEngine,
};
pub use types::*;
