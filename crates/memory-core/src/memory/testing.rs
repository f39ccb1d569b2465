//! In-process stand-ins for the embedding service and vector index.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::embeddings::Embedder;
use super::index::PassageIndex;
use crate::types::Passage;

/// Returns a constant vector, or fails every call
pub struct FakeEmbedder {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn working() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("Embedding API error (401 Unauthorized): bad key"));
        }
        Ok(vec![0.5; 4])
    }
}

/// Ranked passages in stored order; filters on the `fileName` tag
/// unless built with `ignoring_filter`
pub struct FakeIndex {
    passages: Vec<Passage>,
    honor_filter: bool,
    fail: bool,
}

impl FakeIndex {
    pub fn with_passages(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            honor_filter: true,
            fail: false,
        }
    }

    /// Index that returns everything regardless of source tag
    pub fn ignoring_filter(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            honor_filter: false,
            fail: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            passages: Vec::new(),
            honor_filter: true,
            fail: true,
        }
    }
}

#[async_trait]
impl PassageIndex for FakeIndex {
    async fn query(&self, _vector: Vec<f32>, top_k: u64, source_tag: &str) -> Result<Vec<Passage>> {
        if self.fail {
            return Err(anyhow!("Failed to search passages: connection refused"));
        }
        Ok(self
            .passages
            .iter()
            .filter(|p| !self.honor_filter || p.source_tag("fileName") == Some(source_tag))
            .take(top_k as usize)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.fail)
    }
}

pub fn passage(text: &str, file_name: &str) -> Passage {
    Passage::new(text).with_metadata("fileName", file_name)
}
