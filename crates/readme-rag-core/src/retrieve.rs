//! Top-k retrieval over a built index.
//!
//! A [`Retriever`] owns the run's index together with the embedding
//! provider that built it, so queries are always embedded in the same
//! space as the stored vectors.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::embedding::{embed_one, EmbeddingProvider};
use crate::models::{RetrievalResult, ScoredSegment};
use crate::store::{InMemoryIndex, VectorIndex};

pub struct Retriever<I: VectorIndex = InMemoryIndex> {
    index: I,
    provider: Arc<dyn EmbeddingProvider>,
}

impl<I: VectorIndex> Retriever<I> {
    /// `provider` must be the provider the index was built with.
    pub fn new(index: I, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, provider }
    }

    /// Segments most similar to `query`, best first, at most `k` of them.
    ///
    /// Never fails: an empty index, a failed query embedding, or a failed
    /// index lookup all yield an empty result so generation is not blocked.
    pub async fn retrieve(&self, query: &str, k: usize) -> RetrievalResult {
        self.retrieve_scored(query, k)
            .await
            .into_iter()
            .map(|hit| hit.segment)
            .collect()
    }

    /// Like [`retrieve`](Self::retrieve) but keeps the similarity scores.
    pub async fn retrieve_scored(&self, query: &str, k: usize) -> Vec<ScoredSegment> {
        if k == 0 || self.index.is_empty().await {
            return Vec::new();
        }

        let query_vec = match embed_one(self.provider.as_ref(), query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, retrieving nothing");
                return Vec::new();
            }
        };

        match self.index.query_top_k(&query_vec, k).await {
            Ok(mut hits) => {
                hits.truncate(k);
                debug!(k, hits = hits.len(), "retrieved segments");
                hits
            }
            Err(e) => {
                warn!(error = %e, "index query failed, retrieving nothing");
                Vec::new()
            }
        }
    }
}
