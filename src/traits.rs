//! Collaborator traits the pipeline is written against.
//!
//! The pipeline never talks to GitHub or a language model directly. It
//! consumes three capabilities, each implemented for production in this
//! crate and by in-memory fakes in the tests:
//!
//! ```text
//! ┌────────────────────┐   ┌────────────────────┐   ┌────────────────────┐
//! │  RepositorySource  │   │ PullRequestPublisher│   │ GenerationBackend  │
//! │ tree/content/diffs │   │ branch/file/PR      │   │ prompt → text      │
//! └─────────┬──────────┘   └─────────┬──────────┘   └─────────┬──────────┘
//!           │ GitHubRepo             │ GitHubRepo             │ OpenAIChatBackend
//!           ▼                        ▼                        ▼
//!                         run_pipeline() / publish
//! ```
//!
//! Secrets are handed to the implementations at construction time. None of
//! these traits reads the environment.

use anyhow::Result;
use async_trait::async_trait;

use readme_rag_core::models::{FileDiff, Readme, TreeEntry};

// ═══════════════════════════════════════════════════════════════════════
// Repository Source
// ═══════════════════════════════════════════════════════════════════════

/// What a path in the repository resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceContent {
    /// Raw bytes of a file.
    File(Vec<u8>),
    /// A directory; holds the full paths of its entries.
    Directory(Vec<String>),
    NotFound,
}

/// Read access to one repository at one pull request's base.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use readme_rag::traits::{RepositorySource, SourceContent};
/// use readme_rag_core::models::{FileDiff, Readme, TreeEntry};
///
/// struct Empty;
///
/// #[async_trait]
/// impl RepositorySource for Empty {
///     async fn list_tree(&self, _path: &str) -> Result<Vec<TreeEntry>> { Ok(vec![]) }
///     async fn get_file_content(&self, _path: &str) -> Result<SourceContent> {
///         Ok(SourceContent::NotFound)
///     }
///     async fn get_pull_request_diffs(&self, _pr: u64) -> Result<Vec<FileDiff>> { Ok(vec![]) }
///     async fn get_commit_messages(&self, _pr: u64) -> Result<Vec<String>> { Ok(vec![]) }
///     async fn get_readme(&self) -> Result<Readme> {
///         Ok(Readme { content: String::new(), revision_id: String::new() })
///     }
/// }
/// ```
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Immediate children of `path` (`""` is the root).
    async fn list_tree(&self, path: &str) -> Result<Vec<TreeEntry>>;

    /// Content of a single path. `Err` means the source could not be asked
    /// (network, permissions); a missing path is `Ok(NotFound)`.
    async fn get_file_content(&self, path: &str) -> Result<SourceContent>;

    async fn get_pull_request_diffs(&self, pr: u64) -> Result<Vec<FileDiff>>;

    async fn get_commit_messages(&self, pr: u64) -> Result<Vec<String>>;

    /// The README on the base branch, with the revision it was read at.
    async fn get_readme(&self) -> Result<Readme>;
}

// ═══════════════════════════════════════════════════════════════════════
// Pull-Request Publisher
// ═══════════════════════════════════════════════════════════════════════

/// Write access used to propose a README change as a pull request.
#[async_trait]
pub trait PullRequestPublisher: Send + Sync {
    /// Head commit of the base branch.
    async fn base_revision(&self) -> Result<String>;

    /// Create branch `name` pointing at `from_revision`; returns the branch id.
    async fn create_branch(&self, name: &str, from_revision: &str) -> Result<String>;

    /// Commit `content` to `path` on `branch`. `base_revision` is the blob
    /// revision being replaced.
    async fn update_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        base_revision: &str,
    ) -> Result<()>;

    /// Open a pull request from `branch`; returns its number.
    async fn open_pull_request(&self, title: &str, body: &str, branch: &str) -> Result<u64>;
}

// ═══════════════════════════════════════════════════════════════════════
// Generation Backend
// ═══════════════════════════════════════════════════════════════════════

/// One completion request, fully parameterized by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub prompt: String,
}

/// A language model that turns a finished prompt into text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
