//! Content fetcher.
//!
//! Turns repository paths into [`RepositoryFile`]s. A path that cannot be
//! read never fails the batch: it comes back with
//! [`FileContent::Unreadable`] and a reason, which renders as the
//! `Error fetching file content: ...` marker and is skipped by the chunker.
//!
//! Fetches run concurrently, at most `concurrency` at a time, and results
//! are returned in the order of the input paths.

use futures::stream::{self, StreamExt};
use tracing::warn;

use readme_rag_core::models::{FileContent, RepositoryFile};
use readme_rag_core::PipelineError;

use crate::traits::{RepositorySource, SourceContent};

/// Fetch one path. Never fails; unreadable content becomes the sentinel.
pub async fn fetch_file(source: &dyn RepositorySource, path: &str) -> RepositoryFile {
    match source.get_file_content(path).await {
        Ok(SourceContent::File(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => RepositoryFile::text(path, text),
            Err(_) => unreadable(path, "binary or non-UTF-8 content"),
        },
        Ok(SourceContent::Directory(entries)) => RepositoryFile {
            path: path.to_string(),
            content: FileContent::Text(format!("Directory: {}", entries.join(", "))),
            is_directory: true,
        },
        Ok(SourceContent::NotFound) => unreadable(path, "404 Not Found"),
        Err(e) => unreadable(path, &format!("{:#}", e)),
    }
}

/// Fetch every path in `paths`, preserving input order.
pub async fn fetch_files(
    source: &dyn RepositorySource,
    paths: &[String],
    concurrency: usize,
) -> Vec<RepositoryFile> {
    let fetches: Vec<_> = paths.iter().map(|path| fetch_file(source, path)).collect();
    stream::iter(fetches)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

fn unreadable(path: &str, reason: &str) -> RepositoryFile {
    let err = PipelineError::Fetch {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    warn!("{}", err);
    RepositoryFile::unreadable(path, reason)
}
