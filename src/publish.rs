//! README update publication.
//!
//! Proposes generated README text as a pull request: a branch named after
//! the README revision is cut from the base branch head, the README is
//! committed to it, and a pull request is opened against the base branch.

use anyhow::{Context, Result};
use tracing::info;

use readme_rag_core::models::Readme;

use crate::traits::PullRequestPublisher;

pub const COMMIT_MESSAGE: &str = "Proposed README update based on recent code changes";
pub const PR_TITLE: &str = "Update README based on recent changes";
pub const PR_BODY: &str = "This PR proposes an update to the README based on recent code changes. \
Please review and merge if appropriate.";

/// `update-readme-<first 10 characters of the README revision>`.
pub fn branch_name(readme_revision: &str) -> String {
    let short: String = readme_revision.chars().take(10).collect();
    format!("update-readme-{}", short)
}

/// Open a pull request replacing `readme` at `readme_path` with `updated`.
/// Returns the new pull request's number.
pub async fn publish_readme_update(
    publisher: &dyn PullRequestPublisher,
    readme_path: &str,
    readme: &Readme,
    updated: &str,
) -> Result<u64> {
    let base = publisher.base_revision().await?;
    let branch = publisher
        .create_branch(&branch_name(&readme.revision_id), &base)
        .await?;
    publisher
        .update_file(
            readme_path,
            updated,
            COMMIT_MESSAGE,
            &branch,
            &readme.revision_id,
        )
        .await
        .context("README commit failed")?;
    let number = publisher.open_pull_request(PR_TITLE, PR_BODY, &branch).await?;
    info!(pr = number, branch = %branch, "README update proposed");
    Ok(number)
}
