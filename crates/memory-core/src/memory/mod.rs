//! ============================================================================
//! Memory Module - Conversation history and semantic recall for companions
//! ============================================================================
//! Two independent retrieval paths, composed by the caller:
//! - Recent window: the last N turns of an identity's history log
//! - Recall: the K passages from a companion's source material closest to
//!   the current exchange
//!
//! ## Architecture
//! ```text
//! User Message → write_to_history → HistoryDb (redb)
//!                                        ↓
//!                 read_latest_history → recent turns ─┐
//!                                                     ├→ [Prompt]
//! recent turns → Embed → Qdrant search (fileName) ────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use memory_core::{CompanionKey, MemoryManager};
//!
//! let manager = MemoryManager::get_instance().await?;
//! let key = CompanionKey::new("aria", "gpt", user_id);
//!
//! manager.seed_chat_history(&backstory, "\n", &key).await;
//! manager.write_to_history("User: How are you?", &key).await;
//!
//! let recent = manager.read_latest_history(&key).await;
//! let passages = manager.vector_search(&recent, "aria.txt").await;
//! ```
//! ============================================================================

mod embeddings;
mod index;
mod lifecycle;
mod manager;
mod recall;

#[cfg(test)]
mod testing;

// Re-export public types
pub use embeddings::{Embedder, EmbeddingService};
pub use index::{PassageIndex, QdrantPassageIndex};
pub use lifecycle::{get_instance, ManagerCell};
pub use manager::MemoryManager;
pub use recall::RecallEngine;
