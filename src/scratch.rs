//! Scratch sessions and the snapshot materializer.
//!
//! A [`ScratchSession`] is the on-disk working set of one pipeline run: a
//! fresh directory under the configured scratch root, named by a session id
//! that is unique per run. The session removes its directory when it is
//! released or dropped, so it cannot outlive the run on any exit path,
//! including `?` early returns and task cancellation.
//!
//! The [`Materializer`] fills a session from a [`RepositorySource`]:
//!
//! 1. Expand the root listing with an explicit worklist until only files remain.
//! 2. Skip paths matching the exclude globs.
//! 3. Fetch every file through the content fetcher (concurrently, order kept).
//! 4. Write readable files under the session directory, keeping relative paths.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use readme_rag_core::models::{FileContent, RepositoryFile, TreeEntry};
use readme_rag_core::PipelineError;

use crate::fetch::fetch_files;
use crate::traits::RepositorySource;

/// The isolated working set of one pipeline run.
#[derive(Debug)]
pub struct ScratchSession {
    session_id: String,
    root: PathBuf,
    files: Vec<RepositoryFile>,
    released: bool,
}

impl ScratchSession {
    /// Create `<parent>/<session id>`. The id mixes a hash of
    /// `identity` with a random UUID, so concurrent runs for the same
    /// request never share a directory.
    pub fn create(parent: &Path, identity: &str) -> Result<Self> {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create scratch root: {}", parent.display()))?;

        let session_id = format!("{}-{}", short_hash(identity), Uuid::new_v4().simple());
        let root = parent.join(&session_id);
        std::fs::create_dir(&root)
            .with_context(|| format!("Failed to create scratch session: {}", root.display()))?;

        debug!(session = %session_id, root = %root.display(), "scratch session created");
        Ok(Self {
            session_id,
            root,
            files: Vec::new(),
            released: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every fetched entry in path order, unreadable ones included.
    pub fn files(&self) -> &[RepositoryFile] {
        &self.files
    }

    /// Remove the session directory now and report failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_tree(&self.root)
            .with_context(|| format!("Failed to remove scratch session: {}", self.root.display()))?;
        debug!(session = %self.session_id, "scratch session released");
        Ok(())
    }
}

impl Drop for ScratchSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_tree(&self.root) {
            warn!(
                session = %self.session_id,
                error = %e,
                "failed to remove scratch session on drop"
            );
        }
    }
}

fn remove_tree(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid exclude glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

/// Snapshots a repository into a [`ScratchSession`].
pub struct Materializer<'a> {
    source: &'a dyn RepositorySource,
    scratch_root: PathBuf,
    exclude: GlobSet,
    concurrency: usize,
}

impl<'a> Materializer<'a> {
    pub fn new(
        source: &'a dyn RepositorySource,
        scratch_root: impl Into<PathBuf>,
        exclude_globs: &[String],
        concurrency: usize,
    ) -> Result<Self> {
        Ok(Self {
            source,
            scratch_root: scratch_root.into(),
            exclude: build_globset(exclude_globs)?,
            concurrency: concurrency.max(1),
        })
    }

    /// Snapshot everything reachable from `tree` into a new session.
    ///
    /// Unreadable files and unlistable directories are recorded as
    /// sentinels and do not fail the snapshot. Only local I/O errors (the
    /// scratch directory cannot be written) are returned, and the partly
    /// written session is removed before they propagate.
    pub async fn materialize(&self, tree: Vec<TreeEntry>, identity: &str) -> Result<ScratchSession> {
        let mut session = ScratchSession::create(&self.scratch_root, identity)?;

        let (mut paths, unlistable) = self.expand(tree).await;
        paths.sort();
        paths.dedup();

        let mut files = fetch_files(self.source, &paths, self.concurrency).await;

        let mut written = 0usize;
        for file in files.iter_mut() {
            let FileContent::Text(text) = &file.content else {
                continue;
            };
            if file.is_directory {
                continue;
            }
            let Some(relative) = safe_relative(&file.path) else {
                let reason = "path escapes the repository root";
                warn!(
                    "{}",
                    PipelineError::Fetch {
                        path: file.path.clone(),
                        reason: reason.to_string(),
                    }
                );
                file.content = FileContent::Unreadable(reason.to_string());
                continue;
            };

            let dest = session.root.join(relative);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&dest, text.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            written += 1;
        }

        files.extend(unlistable);
        files.sort_by(|a, b| a.path.cmp(&b.path));

        info!(
            session = %session.session_id,
            files = files.len(),
            written,
            "repository materialized"
        );
        session.files = files;
        Ok(session)
    }

    /// Worklist expansion of directories into file paths. Returns the file
    /// paths and a sentinel entry for each directory that could not be listed.
    async fn expand(&self, tree: Vec<TreeEntry>) -> (Vec<String>, Vec<RepositoryFile>) {
        let mut pending: VecDeque<TreeEntry> = tree.into();
        let mut seen_dirs = HashSet::new();
        let mut paths = Vec::new();
        let mut unlistable = Vec::new();

        while let Some(entry) = pending.pop_front() {
            if self.is_excluded(&entry) {
                debug!(path = %entry.path, "excluded");
                continue;
            }
            if !entry.is_directory {
                paths.push(entry.path);
                continue;
            }
            if !seen_dirs.insert(entry.path.clone()) {
                continue;
            }
            match self.source.list_tree(&entry.path).await {
                Ok(children) => pending.extend(children),
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(
                        "{}",
                        PipelineError::Fetch {
                            path: entry.path.clone(),
                            reason: reason.clone(),
                        }
                    );
                    unlistable.push(RepositoryFile {
                        path: entry.path,
                        content: FileContent::Unreadable(reason),
                        is_directory: true,
                    });
                }
            }
        }

        (paths, unlistable)
    }

    /// A directory is excluded when a path beneath it would be.
    fn is_excluded(&self, entry: &TreeEntry) -> bool {
        if self.exclude.is_match(&entry.path) {
            return true;
        }
        entry.is_directory && self.exclude.is_match(format!("{}/_", entry.path))
    }
}

/// `path` as a relative path with only normal components.
fn safe_relative(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SourceContent;
    use anyhow::bail;
    use async_trait::async_trait;
    use readme_rag_core::models::{FileDiff, Readme};
    use std::collections::BTreeMap;

    /// Repository backed by a flat `path -> content` map. Paths listed in
    /// `denied` fail to fetch.
    struct MapSource {
        files: BTreeMap<String, String>,
        denied: Vec<String>,
    }

    impl MapSource {
        fn new(files: &[(&str, &str)], denied: &[&str]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.to_string()))
                    .collect(),
                denied: denied.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn root(&self) -> Vec<TreeEntry> {
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
    }

    #[async_trait]
    impl RepositorySource for MapSource {
        async fn list_tree(&self, path: &str) -> Result<Vec<TreeEntry>> {
            if self.denied.iter().any(|d| d == path) {
                bail!("403 Forbidden");
            }
            Ok(self.children(path))
        }
        async fn get_file_content(&self, path: &str) -> Result<SourceContent> {
            if self.denied.iter().any(|d| d == path) {
                bail!("403 Forbidden");
            }
            Ok(match self.files.get(path) {
                Some(c) => SourceContent::File(c.as_bytes().to_vec()),
                None => SourceContent::NotFound,
            })
        }
        async fn get_pull_request_diffs(&self, _pr: u64) -> Result<Vec<FileDiff>> {
            Ok(vec![])
        }
        async fn get_commit_messages(&self, _pr: u64) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn get_readme(&self) -> Result<Readme> {
            bail!("unused")
        }
    }

    fn count_files(dir: &Path) -> usize {
        let mut n = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                n += count_files(&entry.path());
            } else {
                n += 1;
            }
        }
        n
    }

    #[tokio::test]
    async fn test_materialize_nested_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let source = MapSource::new(
            &[
                ("README.md", "# Demo"),
                ("src/lib.rs", "pub fn a() {}"),
                ("src/deep/nested/mod.rs", "mod x;"),
                ("secret.env", "TOKEN=1"),
            ],
            &["secret.env"],
        );
        let m = Materializer::new(&source, tmp.path(), &[], 2).unwrap();
        let session = m.materialize(source.root(), "octo/widgets#1").await.unwrap();

        let paths: Vec<&str> = session.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["README.md", "secret.env", "src/deep/nested/mod.rs", "src/lib.rs"]
        );
        assert!(session.files()[1].content.is_unreadable());

        let root = session.root().to_path_buf();
        assert_eq!(
            std::fs::read_to_string(root.join("src/deep/nested/mod.rs")).unwrap(),
            "mod x;"
        );
        assert!(!root.join("secret.env").exists());
        assert_eq!(count_files(&root), 3);

        session.release().unwrap();
        assert!(!root.exists());
        assert!(tmp.path().exists());
    }

    #[tokio::test]
    async fn test_drop_removes_session() {
        let tmp = tempfile::tempdir().unwrap();
        let source = MapSource::new(&[("a.txt", "a")], &[]);
        let m = Materializer::new(&source, tmp.path(), &[], 1).unwrap();
        let root = {
            let session = m.materialize(source.root(), "id").await.unwrap();
            assert!(session.root().join("a.txt").exists());
            session.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_excluded_directories_not_listed() {
        let tmp = tempfile::tempdir().unwrap();
        let source = MapSource::new(
            &[
                ("node_modules/pkg/index.js", "x"),
                ("Cargo.lock", "lock"),
                ("src/main.rs", "fn main() {}"),
            ],
            &["node_modules"],
        );
        let globs = vec!["**/node_modules/**".to_string(), "**/*.lock".to_string()];
        let m = Materializer::new(&source, tmp.path(), &globs, 4).unwrap();
        let session = m.materialize(source.root(), "id").await.unwrap();
        let paths: Vec<&str> = session.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.rs"]);
    }

    #[tokio::test]
    async fn test_unlistable_directory_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let source = MapSource::new(&[("private/key.pem", "k"), ("ok.txt", "ok")], &["private"]);
        let m = Materializer::new(&source, tmp.path(), &[], 4).unwrap();
        let session = m.materialize(source.root(), "id").await.unwrap();
        assert_eq!(session.files().len(), 2);
        let private = &session.files()[1];
        assert_eq!(private.path, "private");
        assert!(private.is_directory);
        assert!(private.content.is_unreadable());
    }

    #[test]
    fn test_session_ids_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let a = ScratchSession::create(tmp.path(), "same").unwrap();
        let b = ScratchSession::create(tmp.path(), "same").unwrap();
        assert_ne!(a.session_id(), b.session_id());
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_safe_relative() {
        assert_eq!(safe_relative("a/b.rs"), Some(PathBuf::from("a/b.rs")));
        assert_eq!(safe_relative("./a"), Some(PathBuf::from("a")));
        assert_eq!(safe_relative("../evil"), None);
        assert_eq!(safe_relative("/etc/passwd"), None);
        assert_eq!(safe_relative(""), None);
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let source = MapSource::new(&[], &[]);
        assert!(Materializer::new(&source, "/tmp", &["[".to_string()], 1).is_err());
    }
}
