//! Fixed-window character chunker.
//!
//! Splits each fetched file into [`Segment`]s of `chunk_size` characters,
//! advancing by `chunk_size - overlap` characters per step. Sizes are
//! counted in Unicode scalar values, never bytes, so a window never cuts a
//! multi-byte character in half.
//!
//! # Algorithm
//!
//! 1. Skip files whose content is the fetch error sentinel, and empty files.
//! 2. Content of at most `chunk_size` characters becomes a single segment.
//! 3. Otherwise emit `[start, start + chunk_size)` windows, moving `start`
//!    forward by `chunk_size - overlap` each step.
//! 4. When the text left after a window is shorter than `min_chunk`, it is
//!    folded into that window instead of becoming a tiny trailing segment.
//!
//! Dropping the first `overlap` characters of every segment after the first
//! and concatenating the rest reproduces the file exactly.
//!
//! # Example
//!
//! ```rust
//! use readme_rag_core::chunk::{chunk_text, ChunkParams};
//!
//! let params = ChunkParams::new(1000, 0).unwrap();
//! let segments = chunk_text("b.py", &"x".repeat(1500), &params);
//! assert_eq!(segments.len(), 2);
//! assert_eq!(segments[1].text.len(), 500);
//! ```

use crate::error::PipelineError;
use crate::models::{RepositoryFile, Segment};

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    overlap: usize,
    min_chunk: usize,
}

impl ChunkParams {
    /// Create parameters with no trailing-remainder folding.
    ///
    /// Fails with [`PipelineError::InvalidConfiguration`] unless
    /// `0 ≤ overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, PipelineError> {
        Self::with_min_chunk(chunk_size, overlap, 0)
    }

    /// Create parameters that fold any remainder shorter than `min_chunk`
    /// into the preceding segment.
    pub fn with_min_chunk(
        chunk_size: usize,
        overlap: usize,
        min_chunk: usize,
    ) -> Result<Self, PipelineError> {
        if chunk_size == 0 {
            return Err(PipelineError::invalid("chunk_size must be > 0"));
        }
        if overlap >= chunk_size {
            return Err(PipelineError::invalid(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        if min_chunk >= chunk_size {
            return Err(PipelineError::invalid(format!(
                "min_chunk ({}) must be smaller than chunk_size ({})",
                min_chunk, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
            min_chunk,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn min_chunk(&self) -> usize {
        self.min_chunk
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Chunk every readable file, preserving file order and in-file order.
///
/// Files carrying the fetch error sentinel and directory entries
/// contribute no segments.
pub fn chunk_files(files: &[RepositoryFile], params: &ChunkParams) -> Vec<Segment> {
    files
        .iter()
        .filter(|f| !f.is_directory)
        .filter_map(|f| f.content.as_text().map(|text| (f.path.as_str(), text)))
        .flat_map(|(path, text)| chunk_text(path, text, params))
        .collect()
}

/// Split one document into segments with contiguous indices starting at 0.
///
/// Empty text yields no segments.
pub fn chunk_text(source_path: &str, text: &str, params: &ChunkParams) -> Vec<Segment> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;

    if total <= params.chunk_size {
        return vec![make_segment(source_path, 0, text)];
    }

    let mut segments = Vec::new();
    let mut start = 0usize;

    loop {
        let mut end = (start + params.chunk_size).min(total);
        if total - end < params.min_chunk {
            end = total;
        }

        let index = segments.len();
        segments.push(make_segment(
            source_path,
            index,
            &text[bounds[start]..bounds[end]],
        ));

        if end == total {
            break;
        }
        start += params.step();
    }

    segments
}

fn make_segment(source_path: &str, index: usize, text: &str) -> Segment {
    Segment {
        source_path: source_path.to_string(),
        text: text.to_string(),
        index,
    }
}
