//! In-memory [`VectorIndex`] implementation.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Queries are
//! a linear scan computing cosine similarity against every stored vector.

use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{EmbeddingEntry, ScoredSegment, Segment};

use super::VectorIndex;

/// Brute-force cosine index for one pipeline run.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<Vec<EmbeddingEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source path and index of every stored segment, in insertion order.
    pub fn segment_keys(&self) -> Vec<(String, usize)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|e| (e.segment.source_path.clone(), e.segment.index))
            .collect()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn insert(&self, vector: Vec<f32>, segment: Segment) -> Result<()> {
        if vector.is_empty() {
            bail!("empty embedding vector for {}#{}", segment.source_path, segment.index);
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(first) = entries.first() {
            if first.vector.len() != vector.len() {
                bail!(
                    "embedding has {} dims, index holds {}-dim vectors",
                    vector.len(),
                    first.vector.len()
                );
            }
        }
        entries.push(EmbeddingEntry { vector, segment });
        Ok(())
    }

    async fn query_top_k(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredSegment>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<ScoredSegment> = entries
            .iter()
            .map(|e| ScoredSegment {
                segment: e.segment.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();
        // sort_by is stable: ties stay in insertion order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
