//! ============================================================================
//! Core Types for Companion Memory
//! ============================================================================
//! Identity keying, recall passages, operation outcomes and the error
//! taxonomy shared by the history store and the recall engine.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Separator placed between key components
const KEY_SEPARATOR: char = '-';
/// Escape prefix for separator/escape characters inside a component
const KEY_ESCAPE: char = '\\';

/// Identity of one conversation's memory: (companion, model, user).
///
/// Deserializes from the web layer's camelCase shape. A missing `userId`
/// deserializes to an empty string and fails [`CompanionKey::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionKey {
    #[serde(default)]
    companion_name: String,
    #[serde(default)]
    model_name: String,
    #[serde(default)]
    user_id: String,
}

impl CompanionKey {
    pub fn new(
        companion_name: impl Into<String>,
        model_name: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            companion_name: companion_name.into(),
            model_name: model_name.into(),
            user_id: user_id.into(),
        }
    }

    pub fn companion_name(&self) -> &str {
        &self.companion_name
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Check that every component is present
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.user_id.is_empty() {
            return Err(MemoryError::InvalidIdentity("userId"));
        }
        if self.companion_name.is_empty() {
            return Err(MemoryError::InvalidIdentity("companionName"));
        }
        if self.model_name.is_empty() {
            return Err(MemoryError::InvalidIdentity("modelName"));
        }
        Ok(())
    }

    /// Derive the storage key: `companion-model-user`.
    ///
    /// `-` and `\` inside a component are escaped with `\`, so only the two
    /// joining separators appear unescaped and distinct identities never
    /// collide (`"a-b","c"` vs `"a","b-c"`).
    pub fn derive_key(&self) -> String {
        let mut key = String::with_capacity(
            self.companion_name.len() + self.model_name.len() + self.user_id.len() + 2,
        );
        push_escaped(&mut key, &self.companion_name);
        key.push(KEY_SEPARATOR);
        push_escaped(&mut key, &self.model_name);
        key.push(KEY_SEPARATOR);
        push_escaped(&mut key, &self.user_id);
        key
    }
}

fn push_escaped(key: &mut String, component: &str) {
    for c in component.chars() {
        if c == KEY_SEPARATOR || c == KEY_ESCAPE {
            key.push(KEY_ESCAPE);
        }
        key.push(c);
    }
}

impl std::fmt::Display for CompanionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.companion_name, self.model_name, self.user_id
        )
    }
}

/// A passage returned by semantic recall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Passage text
    pub text: String,
    /// Everything else stored alongside the vector (includes the source tag)
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Passage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata field
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Source tag stored under `field`, if it is a string.
    /// A dotted field (`metadata.fileName`) walks nested objects.
    pub fn source_tag(&self, field: &str) -> Option<&str> {
        if let Some(value) = self.metadata.get(field) {
            return value.as_str();
        }
        let mut parts = field.split('.');
        let mut current = self.metadata.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        current.as_str()
    }
}

/// Result of a recall query.
///
/// `Degraded` carries the failure reason so callers can tell an unreachable
/// index apart from a genuinely empty result.
#[derive(Debug, Clone, PartialEq)]
pub enum RecallOutcome {
    Found(Vec<Passage>),
    Degraded(String),
}

impl RecallOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, RecallOutcome::Degraded(_))
    }

    /// Ranked passages, empty when degraded
    pub fn into_passages(self) -> Vec<Passage> {
        match self {
            RecallOutcome::Found(passages) => passages,
            RecallOutcome::Degraded(_) => Vec::new(),
        }
    }
}

/// Result of appending a turn to history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Stored with this score (milliseconds since epoch)
    Appended { score: i64 },
    /// Identity was invalid, nothing written
    Rejected(String),
    /// Backing store failed, nothing written
    Degraded(String),
}

impl WriteOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, WriteOutcome::Appended { .. })
    }
}

/// Result of seeding a history log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Log was absent and now holds this many seeded lines
    Seeded { lines: usize },
    /// Log already existed, nothing written
    AlreadyPresent,
    /// Identity was invalid, nothing written
    Rejected(String),
    /// Backing store failed
    Degraded(String),
}

/// Error types for the memory subsystem
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("Companion key set incorrectly: missing {0}")]
    InvalidIdentity(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("History store error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),
}
