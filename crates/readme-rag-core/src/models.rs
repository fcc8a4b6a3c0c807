//! Core data models used throughout readme-rag.
//!
//! These types describe what flows through a single pipeline run:
//! repository files fetched from the source, the segments cut from them,
//! the embedding entries built from segments, and the pull-request
//! material the prompt is composed from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Leading text of the marker that replaces content which could not be fetched.
pub const FETCH_ERROR_PREFIX: &str = "Error fetching file content: ";

/// Content of a fetched file: either its text or the reason it is unreadable.
///
/// `Unreadable` is the error sentinel of the content fetcher. It renders as
/// `"Error fetching file content: <reason>"` and never produces segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FileContent {
    Text(String),
    Unreadable(String),
}

impl FileContent {
    /// Returns the text if the file was read successfully.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(text) => Some(text),
            FileContent::Unreadable(_) => None,
        }
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(self, FileContent::Unreadable(_))
    }
}

impl fmt::Display for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileContent::Text(text) => f.write_str(text),
            FileContent::Unreadable(reason) => write!(f, "{}{}", FETCH_ERROR_PREFIX, reason),
        }
    }
}

/// A file (or directory listing) fetched from the repository source.
///
/// Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    pub path: String,
    pub content: FileContent,
    pub is_directory: bool,
}

impl RepositoryFile {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: FileContent::Text(content.into()),
            is_directory: false,
        }
    }

    pub fn unreadable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: FileContent::Unreadable(reason.into()),
            is_directory: false,
        }
    }
}

/// One entry of a repository tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub is_directory: bool,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
        }
    }
}

/// A bounded slice of a document's text; the unit of embedding and retrieval.
///
/// `index` counts from 0 within its source file and follows document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub source_path: String,
    pub text: String,
    pub index: usize,
}

/// A segment together with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddingEntry {
    pub vector: Vec<f32>,
    pub segment: Segment,
}

/// A segment returned from a similarity query, with its cosine score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSegment {
    pub segment: Segment,
    pub score: f32,
}

/// Segments ranked by descending similarity to a query.
pub type RetrievalResult = Vec<Segment>;

/// One file's change in a pull request.
///
/// `patch` is absent for binary files and oversized diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub filename: String,
    pub patch: Option<String>,
}

/// The README as currently committed, with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readme {
    pub content: String,
    pub revision_id: String,
}

/// Everything the prompt composer renders for one request.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub diffs: Vec<FileDiff>,
    pub commit_messages: Vec<String>,
    pub readme_text: String,
    /// Full contents of the files touched by the pull request.
    pub changed_files: Vec<RepositoryFile>,
    pub retrieved_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_renders_marker() {
        let content = FileContent::Unreadable("403 Forbidden".to_string());
        assert_eq!(
            content.to_string(),
            "Error fetching file content: 403 Forbidden"
        );
        assert!(content.is_unreadable());
        assert_eq!(content.as_text(), None);
    }

    #[test]
    fn test_text_renders_verbatim() {
        let file = RepositoryFile::text("a.py", "print('hi')");
        assert_eq!(file.content.to_string(), "print('hi')");
        assert_eq!(file.content.as_text(), Some("print('hi')"));
        assert!(!file.is_directory);
    }
}
