//! GitHub REST connector.
//!
//! [`GitHubClient`] holds the HTTP client, API base URL and token.
//! [`GitHubRepo`] binds it to one repository and base branch and implements
//! both [`RepositorySource`] and [`PullRequestPublisher`] on the contents,
//! pulls and git-refs endpoints.
//!
//! The token is optional: public repositories can be read anonymously,
//! subject to GitHub's lower rate limit. Publishing needs one.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use readme_rag_core::models::{FileDiff, Readme, TreeEntry};

use crate::config::{GitHubConfig, Secrets};
use crate::traits::{PullRequestPublisher, RepositorySource, SourceContent};

const USER_AGENT: &str = concat!("readme-rag/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: usize = 100;
/// Result count returned by the discovery endpoints.
const DISCOVERY_LIMIT: usize = 5;

/// `owner/name` of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parse `owner/name`, an `https://github.com/owner/name` URL, or a
/// `git@github.com:owner/name.git` remote.
pub fn parse_repo(input: &str) -> Result<RepoRef> {
    let trimmed = input.trim().trim_end_matches('/');
    let rest = trimmed
        .strip_prefix("git@github.com:")
        .or_else(|| trimmed.strip_prefix("https://github.com/"))
        .or_else(|| trimmed.strip_prefix("http://github.com/"))
        .or_else(|| trimmed.strip_prefix("github.com/"))
        .unwrap_or(trimmed);
    let rest = rest.trim_end_matches(".git");

    let mut parts = rest.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(RepoRef {
            owner: owner.to_string(),
            name: name.to_string(),
        }),
        _ => bail!("Invalid repository '{}': expected owner/name", input),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Client
// ═══════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct PullSummary {
    number: u64,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, secrets: &Secrets) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("Invalid github.api_url: {}", config.api_url))?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            api_url,
            token: secrets.github_token.clone(),
        })
    }

    /// Bind the client to one repository.
    pub fn repository(&self, repo: RepoRef, config: &GitHubConfig) -> GitHubRepo {
        GitHubRepo {
            client: self.clone(),
            repo,
            base_branch: config.base_branch.clone(),
            readme_path: config.readme_path.clone(),
        }
    }

    /// Full names of the first repositories matching `query`.
    pub async fn search_repositories(&self, query: &str) -> Result<Vec<String>> {
        let mut url = self.endpoint(&["search", "repositories"])?;
        url.query_pairs_mut().append_pair("q", query);
        let found: SearchResponse = self.get_json(url).await?;
        Ok(found
            .items
            .into_iter()
            .take(DISCOVERY_LIMIT)
            .map(|item| item.full_name)
            .collect())
    }

    /// Numbers of the first open pull requests of `repo`.
    pub async fn list_pull_requests(&self, repo: &RepoRef) -> Result<Vec<u64>> {
        let url = self.endpoint(&["repos", &repo.owner, &repo.name, "pulls"])?;
        let pulls: Vec<PullSummary> = self.get_json(url).await?;
        Ok(pulls
            .into_iter()
            .take(DISCOVERY_LIMIT)
            .map(|pr| pr.number)
            .collect())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("github.api_url cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            bail!("GitHub API request failed: {} - {}", status, error_body);
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "GET");
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json::<T>().await?)
    }

    /// Follow `page=` pagination until a short page comes back.
    async fn get_paginated<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let mut all = Vec::new();
        for page in 1.. {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());
            let items: Vec<T> = self.get_json(page_url).await?;
            let short = items.len() < PER_PAGE;
            all.extend(items);
            if short {
                break;
            }
        }
        Ok(all)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Repository
// ═══════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct GitHubRepo {
    client: GitHubClient,
    repo: RepoRef,
    base_branch: String,
    readme_path: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentEntry>),
    Single(ContentEntry),
}

#[derive(Debug, Deserialize)]
struct PullFile {
    filename: String,
    #[serde(default)]
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullCommit {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Serialize)]
struct BranchPayload {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct UpdateFilePayload<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Debug, Serialize)]
struct PullRequestPayload<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedPull {
    number: u64,
}

impl GitHubRepo {
    fn repo_endpoint(&self, tail: &[&str]) -> Result<Url> {
        let mut segments = vec!["repos", self.repo.owner.as_str(), self.repo.name.as_str()];
        segments.extend_from_slice(tail);
        self.client.endpoint(&segments)
    }

    fn contents_url(&self, path: &str) -> Result<Url> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let mut url = self.repo_endpoint(&segments)?;
        url.query_pairs_mut().append_pair("ref", &self.base_branch);
        Ok(url)
    }

    /// `None` on 404.
    async fn get_contents(&self, path: &str) -> Result<Option<ContentsResponse>> {
        let url = self.contents_url(path)?;
        debug!(%url, "GET contents");
        let response = self
            .client
            .request(Method::GET, url)
            .send()
            .await
            .with_context(|| format!("failed to request contents of '{}'", path))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            bail!("GitHub API request failed: {} - {}", status, error_body);
        }
        Ok(Some(response.json().await?))
    }
}

/// Decode the base64 `content` field of a contents-API file entry.
fn decode_content(entry: &ContentEntry) -> Result<Vec<u8>> {
    match (entry.encoding.as_deref(), entry.content.as_deref()) {
        (Some("base64"), Some(encoded)) => {
            let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
            BASE64
                .decode(compact)
                .with_context(|| format!("invalid base64 content for '{}'", entry.path))
        }
        (Some("none"), _) => bail!("'{}' is too large for the contents API", entry.path),
        (encoding, _) => bail!(
            "unsupported content encoding {:?} for '{}'",
            encoding,
            entry.path
        ),
    }
}

#[async_trait]
impl RepositorySource for GitHubRepo {
    async fn list_tree(&self, path: &str) -> Result<Vec<TreeEntry>> {
        match self.get_contents(path).await? {
            Some(ContentsResponse::Listing(entries)) => Ok(entries
                .into_iter()
                .map(|e| TreeEntry {
                    is_directory: e.kind == "dir",
                    path: e.path,
                })
                .collect()),
            Some(ContentsResponse::Single(entry)) => Ok(vec![TreeEntry {
                is_directory: entry.kind == "dir",
                path: entry.path,
            }]),
            None => bail!("path '{}' not found in {}", path, self.repo),
        }
    }

    async fn get_file_content(&self, path: &str) -> Result<SourceContent> {
        match self.get_contents(path).await? {
            Some(ContentsResponse::Listing(entries)) => Ok(SourceContent::Directory(
                entries.into_iter().map(|e| e.path).collect(),
            )),
            Some(ContentsResponse::Single(entry)) => Ok(SourceContent::File(decode_content(&entry)?)),
            None => Ok(SourceContent::NotFound),
        }
    }

    async fn get_pull_request_diffs(&self, pr: u64) -> Result<Vec<FileDiff>> {
        let url = self.repo_endpoint(&["pulls", &pr.to_string(), "files"])?;
        let files: Vec<PullFile> = self
            .client
            .get_paginated(url)
            .await
            .with_context(|| format!("failed to list files of pull request #{}", pr))?;
        Ok(files
            .into_iter()
            .map(|f| FileDiff {
                filename: f.filename,
                patch: f.patch,
            })
            .collect())
    }

    async fn get_commit_messages(&self, pr: u64) -> Result<Vec<String>> {
        let url = self.repo_endpoint(&["pulls", &pr.to_string(), "commits"])?;
        let commits: Vec<PullCommit> = self
            .client
            .get_paginated(url)
            .await
            .with_context(|| format!("failed to list commits of pull request #{}", pr))?;
        Ok(commits.into_iter().map(|c| c.commit.message).collect())
    }

    async fn get_readme(&self) -> Result<Readme> {
        let entry = match self.get_contents(&self.readme_path).await? {
            Some(ContentsResponse::Single(entry)) => entry,
            Some(ContentsResponse::Listing(_)) => {
                bail!("'{}' is a directory, not a README", self.readme_path)
            }
            None => bail!("{} has no '{}'", self.repo, self.readme_path),
        };
        let bytes = decode_content(&entry)?;
        let content = String::from_utf8(bytes)
            .with_context(|| format!("'{}' is not valid UTF-8", self.readme_path))?;
        Ok(Readme {
            content,
            revision_id: entry.sha,
        })
    }
}

#[async_trait]
impl PullRequestPublisher for GitHubRepo {
    async fn base_revision(&self) -> Result<String> {
        let url = self.repo_endpoint(&["git", "ref", "heads", &self.base_branch])?;
        let base: GitRef = self
            .client
            .get_json(url)
            .await
            .with_context(|| format!("failed to resolve branch '{}'", self.base_branch))?;
        Ok(base.object.sha)
    }

    async fn create_branch(&self, name: &str, from_revision: &str) -> Result<String> {
        debug!(branch = name, from = from_revision, "creating branch");
        let url = self.repo_endpoint(&["git", "refs"])?;
        let payload = BranchPayload {
            ref_name: format!("refs/heads/{}", name),
            sha: from_revision.to_string(),
        };
        self.client
            .send(self.client.request(Method::POST, url).json(&payload))
            .await
            .with_context(|| format!("failed to create branch '{}'", name))?;
        Ok(name.to_string())
    }

    async fn update_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        base_revision: &str,
    ) -> Result<()> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.repo_endpoint(&segments)?;
        let payload = UpdateFilePayload {
            message,
            content: BASE64.encode(content.as_bytes()),
            sha: base_revision,
            branch,
        };
        self.client
            .send(self.client.request(Method::PUT, url).json(&payload))
            .await
            .with_context(|| format!("failed to update '{}' on '{}'", path, branch))?;
        Ok(())
    }

    async fn open_pull_request(&self, title: &str, body: &str, branch: &str) -> Result<u64> {
        let url = self.repo_endpoint(&["pulls"])?;
        let payload = PullRequestPayload {
            title,
            body,
            head: branch,
            base: &self.base_branch,
        };
        let response = self
            .client
            .send(self.client.request(Method::POST, url).json(&payload))
            .await
            .with_context(|| format!("failed to open pull request from '{}'", branch))?;
        let created: CreatedPull = response.json().await?;
        Ok(created.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_forms() {
        let expected = RepoRef {
            owner: "octo".to_string(),
            name: "widgets".to_string(),
        };
        for input in [
            "octo/widgets",
            "https://github.com/octo/widgets",
            "https://github.com/octo/widgets.git",
            "https://github.com/octo/widgets/",
            "git@github.com:octo/widgets.git",
            "github.com/octo/widgets",
        ] {
            assert_eq!(parse_repo(input).unwrap(), expected, "input: {}", input);
        }
        assert_eq!(expected.to_string(), "octo/widgets");
    }

    #[test]
    fn test_parse_repo_rejects_garbage() {
        assert!(parse_repo("widgets").is_err());
        assert!(parse_repo("a/b/c").is_err());
        assert!(parse_repo("/b").is_err());
    }

    #[test]
    fn test_decode_content_ignores_line_breaks() {
        let entry = ContentEntry {
            path: "README.md".to_string(),
            kind: "file".to_string(),
            sha: "abc".to_string(),
            content: Some("IyBE\nZW1v\n".to_string()),
            encoding: Some("base64".to_string()),
        };
        assert_eq!(decode_content(&entry).unwrap(), b"# Demo");
    }

    #[test]
    fn test_decode_content_too_large() {
        let entry = ContentEntry {
            path: "huge.bin".to_string(),
            kind: "file".to_string(),
            sha: String::new(),
            content: Some(String::new()),
            encoding: Some("none".to_string()),
        };
        assert!(decode_content(&entry)
            .unwrap_err()
            .to_string()
            .contains("too large"));
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let client = GitHubClient::new(&GitHubConfig::default(), &Secrets::default()).unwrap();
        let repo = client.repository(parse_repo("octo/widgets").unwrap(), &GitHubConfig::default());
        let url = repo.contents_url("docs/my file.md").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/widgets/contents/docs/my%20file.md?ref=main"
        );
    }
}
