//! ============================================================================
//! Memory Configuration - Environment-driven settings
//! ============================================================================
//! Backing store location, vector index and embedding credentials, and the
//! retrieval limits used by the memory manager.
//! ============================================================================

use std::path::PathBuf;

use crate::types::MemoryError;

/// Default number of history lines returned by a recent-window read
pub const DEFAULT_RECENT_WINDOW: usize = 30;

/// Default number of passages returned by recall
pub const DEFAULT_RECALL_TOP_K: u64 = 3;

/// Default OpenAI-compatible embeddings endpoint
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model (matches how the index was populated)
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Default payload key holding passage text
pub const DEFAULT_TEXT_FIELD: &str = "text";

/// Default payload key holding the source tag
pub const DEFAULT_SOURCE_FIELD: &str = "fileName";

/// Settings for the memory manager
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// History database file. `None` resolves to ~/.companion/memory.redb
    pub history_db_path: Option<PathBuf>,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    /// Name of the pre-populated vector collection
    pub collection: String,
    pub embedding_api_key: String,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub recent_window: usize,
    pub recall_top_k: u64,
    pub text_field: String,
    pub source_field: String,
}

impl MemoryConfig {
    /// Config with defaults for everything but the required endpoints and keys
    pub fn new(qdrant_url: String, collection: String, embedding_api_key: String) -> Self {
        Self {
            history_db_path: None,
            qdrant_url,
            qdrant_api_key: None,
            collection,
            embedding_api_key,
            embedding_base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            recent_window: DEFAULT_RECENT_WINDOW,
            recall_top_k: DEFAULT_RECALL_TOP_K,
            text_field: DEFAULT_TEXT_FIELD.to_string(),
            source_field: DEFAULT_SOURCE_FIELD.to_string(),
        }
    }

    /// Load from process environment variables
    pub fn from_env() -> Result<Self, MemoryError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MemoryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |names: &[&str]| -> Option<String> {
            names
                .iter()
                .filter_map(|name| lookup(*name))
                .find(|value| !value.trim().is_empty())
        };
        let require = |names: &[&str]| -> Result<String, MemoryError> {
            get(names).ok_or_else(|| {
                MemoryError::Config(format!("{} is not set", names.join(" or ")))
            })
        };

        let mut config = Self::new(
            require(&["QDRANT_URL"])?,
            require(&["QDRANT_COLLECTION", "VECTOR_INDEX"])?,
            require(&["OPENAI_API_KEY", "OPEN_AI_KEY"])?,
        );

        config.history_db_path = get(&["MEMORY_DB_PATH"]).map(PathBuf::from);
        config.qdrant_api_key = get(&["QDRANT_API_KEY"]);

        if let Some(url) = get(&["EMBEDDING_BASE_URL"]) {
            config.embedding_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get(&["EMBEDDING_MODEL"]) {
            config.embedding_model = model;
        }
        if let Some(window) = get(&["MEMORY_RECENT_WINDOW"]) {
            config.recent_window = parse_positive(&window, "MEMORY_RECENT_WINDOW")? as usize;
        }
        if let Some(top_k) = get(&["MEMORY_RECALL_TOP_K"]) {
            config.recall_top_k = parse_positive(&top_k, "MEMORY_RECALL_TOP_K")?;
        }
        if let Some(field) = get(&["MEMORY_TEXT_FIELD"]) {
            config.text_field = field;
        }
        if let Some(field) = get(&["MEMORY_SOURCE_FIELD"]) {
            config.source_field = field;
        }

        Ok(config)
    }
}

fn parse_positive(value: &str, name: &str) -> Result<u64, MemoryError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(MemoryError::Config(format!(
            "{} must be a positive integer, got '{}'",
            name, value
        ))),
    }
}
