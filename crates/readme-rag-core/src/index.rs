//! Index builder: embeds segments and loads them into a fresh index.
//!
//! Segments are embedded in batches of `batch_size`. When a whole batch
//! fails, each segment of that batch is retried on its own so a single bad
//! segment only drops itself. Failures are logged and counted, never
//! returned: if every segment fails the run continues with an empty index
//! and retrieval yields nothing.

use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;
use crate::models::Segment;
use crate::store::VectorIndex;

/// Counts reported by [`build_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Segments handed to the builder.
    pub segments: usize,
    /// Segments stored in the index.
    pub indexed: usize,
    /// Segments left out because embedding or insertion failed.
    pub dropped: usize,
}

/// Build a new index of type `I` from `segments`.
///
/// The index always starts empty, so entries from different runs never mix.
pub async fn build_index<I>(
    segments: Vec<Segment>,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
) -> (I, IndexStats)
where
    I: VectorIndex + Default,
{
    let index = I::default();
    let mut stats = IndexStats {
        segments: segments.len(),
        ..Default::default()
    };
    let batch_size = batch_size.max(1);

    for batch in segments.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();

        let vectors = match provider.embed(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => vectors
                .into_iter()
                .map(Ok)
                .collect::<Vec<anyhow::Result<Vec<f32>>>>(),
            Ok(vectors) => {
                debug!(
                    expected = batch.len(),
                    got = vectors.len(),
                    "embedding batch returned wrong count, retrying one by one"
                );
                embed_individually(provider, batch).await
            }
            Err(e) => {
                debug!(error = %e, "embedding batch failed, retrying one by one");
                embed_individually(provider, batch).await
            }
        };

        for (segment, vector) in batch.iter().zip(vectors) {
            let outcome = match vector {
                Ok(v) => index.insert(v, segment.clone()).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => stats.indexed += 1,
                Err(e) => {
                    let err = PipelineError::Indexing {
                        source_path: segment.source_path.clone(),
                        index: segment.index,
                        reason: e.to_string(),
                    };
                    warn!("{}", err);
                    stats.dropped += 1;
                }
            }
        }
    }

    (index, stats)
}

async fn embed_individually(
    provider: &dyn EmbeddingProvider,
    batch: &[Segment],
) -> Vec<anyhow::Result<Vec<f32>>> {
    let mut out = Vec::with_capacity(batch.len());
    for segment in batch {
        let result = provider
            .embed(std::slice::from_ref(&segment.text))
            .await
            .and_then(|mut v| {
                if v.len() == 1 {
                    Ok(v.remove(0))
                } else {
                    Err(anyhow::anyhow!("expected 1 embedding, got {}", v.len()))
                }
            });
        out.push(result);
    }
    out
}
