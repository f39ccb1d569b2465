//! ============================================================================
//! Lifecycle - One shared memory manager per process
//! ============================================================================
//! Prefer building a `MemoryManager` at startup and passing it down. For
//! callers that need lazy access, `get_instance` initializes once behind a
//! `tokio::sync::OnceCell`: concurrent first callers wait on the same
//! initialization, and a failed initialization leaves the cell empty so the
//! next call tries again.
//! ============================================================================

use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, error};

use super::manager::MemoryManager;
use crate::types::MemoryError;

static INSTANCE: ManagerCell = ManagerCell::new();

/// Lazily-initialized shared manager handle
pub struct ManagerCell {
    cell: OnceCell<Arc<MemoryManager>>,
}

impl ManagerCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Return the shared manager, running `init` if this is the first call
    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<Arc<MemoryManager>, MemoryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MemoryManager, MemoryError>>,
    {
        self.cell
            .get_or_try_init(|| async move {
                debug!("Initializing shared memory manager");
                init().await.map(Arc::new).map_err(|e| {
                    error!("Memory manager initialization failed: {}", e);
                    e
                })
            })
            .await
            .cloned()
    }

    /// The manager, if already initialized
    pub fn get(&self) -> Option<Arc<MemoryManager>> {
        self.cell.get().cloned()
    }
}

impl Default for ManagerCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide manager built from environment configuration
pub async fn get_instance() -> Result<Arc<MemoryManager>, MemoryError> {
    INSTANCE.get_or_init(MemoryManager::from_env).await
}
