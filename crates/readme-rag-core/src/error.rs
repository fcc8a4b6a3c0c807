//! Error taxonomy shared by every pipeline stage.
//!
//! Only [`PipelineError::InvalidConfiguration`] is fatal. Fetch, indexing,
//! and generation failures are recorded and degrade the run instead of
//! aborting it; they still get a variant so callers can log and branch on
//! them uniformly.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Chunk size, overlap, token budget, or another setting is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A single file or directory could not be read from the repository source.
    #[error("could not fetch '{path}': {reason}")]
    Fetch { path: String, reason: String },

    /// Embedding a segment failed; the segment is left out of the index.
    #[error("could not embed segment {index} of '{source_path}': {reason}")]
    Indexing {
        source_path: String,
        index: usize,
        reason: String,
    },

    /// The generation backend failed or timed out.
    #[error("generation failed: {0}")]
    Generation(String),
}

impl PipelineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}
