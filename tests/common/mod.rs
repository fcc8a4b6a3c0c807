#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use readme_rag::config::Config;
use readme_rag::traits::{
    CompletionRequest, GenerationBackend, PullRequestPublisher, RepositorySource, SourceContent,
};
use readme_rag_core::embedding::EmbeddingProvider;
use readme_rag_core::models::{FileDiff, Readme, TreeEntry};

pub const README: &str = "# Widgets\n\nA widget library.";

/// In-memory repository with one pull request. Also records publisher calls.
pub struct FakeRepo {
    pub files: BTreeMap<String, String>,
    pub denied: HashSet<String>,
    pub diffs: Vec<FileDiff>,
    pub commits: Vec<String>,
    pub readme_unreachable: bool,
    pub published: Mutex<Vec<String>>,
}

impl FakeRepo {
    pub fn widgets() -> Self {
        let mut files = BTreeMap::new();
        files.insert("README.md".to_string(), README.to_string());
        files.insert(
            "src/lib.rs".to_string(),
            "pub fn spin_widget() {}\n".to_string(),
        );
        files.insert(
            "docs/usage.md".to_string(),
            "Spin the widget with spin_widget. ".repeat(15),
        );
        files.insert("secret.env".to_string(), "TOKEN=hunter2".to_string());

        Self {
            files,
            denied: ["secret.env".to_string()].into_iter().collect(),
            diffs: vec![FileDiff {
                filename: "src/lib.rs".to_string(),
                patch: Some("+pub fn spin_widget() {}".to_string()),
            }],
            commits: vec!["Add spin_widget".to_string()],
            readme_unreachable: false,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> Vec<TreeEntry> {
        self.children("")
    }

    fn children(&self, dir: &str) -> Vec<TreeEntry> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let mut out: BTreeMap<String, bool> = BTreeMap::new();
        for path in self.files.keys() {
            if let Some(rest) = path.strip_prefix(&prefix) {
                match rest.split_once('/') {
                    Some((head, _)) => {
                        out.insert(format!("{}{}", prefix, head), true);
                    }
                    None => {
                        out.insert(path.clone(), false);
                    }
                }
            }
        }
        out.into_iter()
            .map(|(path, is_directory)| TreeEntry { path, is_directory })
            .collect()
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositorySource for FakeRepo {
    async fn list_tree(&self, path: &str) -> Result<Vec<TreeEntry>> {
        Ok(self.children(path))
    }

    async fn get_file_content(&self, path: &str) -> Result<SourceContent> {
        if self.denied.contains(path) {
            bail!("403 Forbidden");
        }
        Ok(match self.files.get(path) {
            Some(content) => SourceContent::File(content.as_bytes().to_vec()),
            None => SourceContent::NotFound,
        })
    }

    async fn get_pull_request_diffs(&self, _pr: u64) -> Result<Vec<FileDiff>> {
        Ok(self.diffs.clone())
    }

    async fn get_commit_messages(&self, _pr: u64) -> Result<Vec<String>> {
        Ok(self.commits.clone())
    }

    async fn get_readme(&self) -> Result<Readme> {
        if self.readme_unreachable {
            bail!("connection refused");
        }
        Ok(Readme {
            content: README.to_string(),
            revision_id: "5ee1d0c0ffee1234".to_string(),
        })
    }
}

#[async_trait]
impl PullRequestPublisher for FakeRepo {
    async fn base_revision(&self) -> Result<String> {
        Ok("basehead".to_string())
    }

    async fn create_branch(&self, name: &str, from_revision: &str) -> Result<String> {
        self.published
            .lock()
            .unwrap()
            .push(format!("branch {} {}", name, from_revision));
        Ok(name.to_string())
    }

    async fn update_file(
        &self,
        path: &str,
        content: &str,
        _message: &str,
        branch: &str,
        _base_revision: &str,
    ) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push(format!("update {} {} {}", path, branch, content));
        Ok(())
    }

    async fn open_pull_request(&self, title: &str, _body: &str, branch: &str) -> Result<u64> {
        self.published
            .lock()
            .unwrap()
            .push(format!("pr {} {}", branch, title));
        Ok(7)
    }
}

/// Hashed bag-of-words vectors: deterministic, and texts sharing words
/// point in similar directions.
pub struct BagOfWords;

pub const BOW_DIMS: usize = 64;

fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; BOW_DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
    {
        let slot = (fnv1a(&word.to_lowercase()) % BOW_DIMS as u64) as usize;
        v[slot] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        BOW_DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Embedder that always fails.
pub struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    fn model_name(&self) -> &str {
        "broken"
    }
    fn dims(&self) -> usize {
        BOW_DIMS
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("quota exceeded")
    }
}

/// Answers every request from a fixed script and records what it was sent.
pub struct ScriptedBackend {
    reply: std::result::Result<String, String>,
    pub seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn answering(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.seen.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(reason) => bail!("{}", reason),
        }
    }
}

/// Never answers. Notes whether a scratch session existed when called.
pub struct HangingBackend {
    pub scratch_root: PathBuf,
    pub saw_session: AtomicBool,
}

impl HangingBackend {
    pub fn new(scratch_root: &Path) -> Self {
        Self {
            scratch_root: scratch_root.to_path_buf(),
            saw_session: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl GenerationBackend for HangingBackend {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        if scratch_entries(&self.scratch_root) == 1 {
            self.saw_session.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".to_string())
    }
}

/// RAG configuration with small chunks and scratch under `scratch_root`.
pub fn rag_config(scratch_root: &Path) -> Config {
    let mut config = Config::default();
    config.embedding.provider = "openai".to_string();
    config.embedding.model = Some("bag-of-words".to_string());
    config.embedding.dims = Some(BOW_DIMS);
    config.embedding.batch_size = 2;
    config.chunking.chunk_size = 200;
    config.retrieval.top_k = 2;
    config.retrieval.exclude_globs = Vec::new();
    config.scratch.root = scratch_root.to_path_buf();
    config
}

pub fn direct_config(scratch_root: &Path) -> Config {
    let mut config = Config::direct();
    config.scratch.root = scratch_root.to_path_buf();
    config
}

/// Entries directly under the scratch root; 0 when it does not exist.
pub fn scratch_entries(scratch_root: &Path) -> usize {
    match std::fs::read_dir(scratch_root) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}
