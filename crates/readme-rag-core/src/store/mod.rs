//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only capability the index builder and
//! retriever need: insert a vector with its segment, and query the top-k
//! most similar segments. [`memory::InMemoryIndex`] is a brute-force
//! implementation; a dedicated vector database can sit behind the same
//! contract.
//!
//! An index holds the entries of exactly one pipeline run. Builders always
//! start from [`Default::default`], never from an index used before.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ScoredSegment, Segment};

pub use memory::InMemoryIndex;

/// Abstract similarity index scoped to one pipeline run.
///
/// All operations are async (via `async-trait`) so that networked
/// backends fit the same trait. The in-memory implementation returns
/// immediately-ready futures.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](VectorIndex::insert) | Add a vector and its segment |
/// | [`query_top_k`](VectorIndex::query_top_k) | Rank stored segments against a query vector |
/// | [`len`](VectorIndex::len) | Number of stored entries |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store `vector` as the embedding of `segment`.
    ///
    /// Implementations may reject vectors whose dimensionality differs from
    /// the entries already stored.
    async fn insert(&self, vector: Vec<f32>, segment: Segment) -> Result<()>;

    /// Return at most `k` segments by descending similarity to `vector`.
    ///
    /// Equal scores keep insertion order. An empty index yields an empty
    /// result, not an error.
    async fn query_top_k(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredSegment>>;

    /// Number of entries currently stored.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
