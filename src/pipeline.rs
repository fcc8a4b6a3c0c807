//! Pipeline orchestration.
//!
//! One run answers one pull-request-update request:
//!
//! ```text
//! Idle → Materializing → Chunking → Indexing → Ready → Generating → Done
//!   └──────────────── any unrecoverable error ───────────────→ Failed
//! ```
//!
//! Direct mode goes from `Idle` straight to `Ready`. Every run owns its
//! scratch session and its index; neither is shared with another run. The
//! index is dropped before the session is released, and the session is
//! released on every exit path (explicitly on success, by `Drop` when an
//! error or cancellation unwinds the run).

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

use readme_rag_core::chunk::chunk_files;
use readme_rag_core::embedding::EmbeddingProvider;
use readme_rag_core::index::{build_index, IndexStats};
use readme_rag_core::models::PromptContext;
use readme_rag_core::prompt::PromptComposer;
use readme_rag_core::retrieve::Retriever;
use readme_rag_core::store::InMemoryIndex;
use readme_rag_core::tokens::{BpeTokenizer, Tokenizer};
use readme_rag_core::PipelineError;

use crate::config::{Config, RetrievalMode, Secrets};
use crate::embedding::create_provider;
use crate::fetch::fetch_files;
use crate::generate::{GenerationClient, GenerationOutcome, OpenAIChatBackend};
use crate::publish::publish_readme_update;
use crate::scratch::Materializer;
use crate::traits::{GenerationBackend, PullRequestPublisher, RepositorySource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Materializing,
    Chunking,
    Indexing,
    Ready,
    Generating,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Materializing => "materializing",
            PipelineStage::Chunking => "chunking",
            PipelineStage::Indexing => "indexing",
            PipelineStage::Ready => "ready",
            PipelineStage::Generating => "generating",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Long-lived collaborators shared by every run.
#[derive(Clone)]
pub struct PipelineDeps {
    pub config: Arc<Config>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub composer: PromptComposer,
    pub generator: Arc<GenerationClient>,
}

impl PipelineDeps {
    /// Validates `config` and wires the given embedder and backend.
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let tokenizer: Arc<dyn Tokenizer> =
            Arc::new(BpeTokenizer::for_model(&config.prompt.tokenizer_model)?);
        let composer = PromptComposer::new(tokenizer.clone(), config.prompt.max_tokens)?;
        let generator = Arc::new(GenerationClient::new(
            backend,
            config.generation.clone(),
            tokenizer,
            config.retrieval.top_k,
        ));
        Ok(Self {
            config: Arc::new(config),
            embedder,
            composer,
            generator,
        })
    }

    /// Production wiring: configured embedding provider and OpenAI chat.
    pub fn from_config(config: Config, secrets: &Secrets) -> Result<Self> {
        config.validate()?;
        let embedder = create_provider(&config.embedding, secrets)?;
        let backend = Arc::new(OpenAIChatBackend::new(&config.generation, secrets)?);
        Self::new(config, embedder, backend)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Names the run in logs and seeds the scratch session id.
    pub identity: String,
    pub pr_number: u64,
    pub mode: RetrievalMode,
    pub publish: bool,
}

impl PipelineRequest {
    /// A request using the configured mode and publish setting.
    pub fn new(repo: &str, pr_number: u64, config: &Config) -> Self {
        Self {
            identity: format!("{}#{}", repo, pr_number),
            pr_number,
            mode: config.retrieval.mode,
            publish: config.publish.enabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stage: PipelineStage,
    pub mode: RetrievalMode,
    pub outcome: GenerationOutcome,
    /// Entries in the scratch session, unreadable ones included.
    pub files: usize,
    pub segments: usize,
    pub index: IndexStats,
    pub prompt_tokens: usize,
    pub published_pr: Option<u64>,
}

struct StageTracker<'a> {
    run: &'a str,
    stage: PipelineStage,
}

impl<'a> StageTracker<'a> {
    fn new(run: &'a str) -> Self {
        Self {
            run,
            stage: PipelineStage::Idle,
        }
    }

    fn enter(&mut self, next: PipelineStage) {
        info!(run = self.run, from = %self.stage, to = %next, "pipeline stage");
        self.stage = next;
    }

    fn fail(&mut self, err: &anyhow::Error) {
        error!(run = self.run, stage = %self.stage, error = %format!("{:#}", err), "pipeline failed");
        self.stage = PipelineStage::Failed;
    }
}

/// Execute one run.
///
/// Generation failures do not fail the run: they come back as
/// [`GenerationOutcome::Failed`] in the report. `Err` is reserved for
/// invalid configuration, an unreachable repository, local scratch I/O and
/// publication failures.
pub async fn run_pipeline(
    deps: &PipelineDeps,
    source: &dyn RepositorySource,
    publisher: Option<&dyn PullRequestPublisher>,
    request: &PipelineRequest,
) -> Result<RunReport> {
    let mut tracker = StageTracker::new(&request.identity);
    let result = run_stages(deps, source, publisher, request, &mut tracker).await;
    if let Err(e) = &result {
        tracker.fail(e);
    }
    result
}

async fn run_stages(
    deps: &PipelineDeps,
    source: &dyn RepositorySource,
    publisher: Option<&dyn PullRequestPublisher>,
    request: &PipelineRequest,
    tracker: &mut StageTracker<'_>,
) -> Result<RunReport> {
    let config = deps.config.as_ref();
    config.validate()?;
    if request.mode == RetrievalMode::Rag && !config.embedding.is_enabled() {
        return Err(PipelineError::invalid("RAG mode requires an embedding provider").into());
    }
    let chunk_params = config.chunking.params()?;

    let readme = source
        .get_readme()
        .await
        .with_context(|| format!("failed to read README for {}", request.identity))?;
    let diffs = source
        .get_pull_request_diffs(request.pr_number)
        .await
        .with_context(|| format!("failed to read diffs for {}", request.identity))?;
    let commit_messages = source
        .get_commit_messages(request.pr_number)
        .await
        .with_context(|| format!("failed to read commits for {}", request.identity))?;

    let changed_files = if config.prompt.include_changed_files {
        let paths: Vec<String> = diffs.iter().map(|d| d.filename.clone()).collect();
        fetch_files(source, &paths, config.github.fetch_concurrency).await
    } else {
        Vec::new()
    };

    let ctx = PromptContext {
        diffs,
        commit_messages,
        readme_text: readme.content.clone(),
        changed_files,
        retrieved_text: None,
    };
    let prompt = deps.composer.compose(&ctx);

    let mut report = RunReport {
        stage: PipelineStage::Idle,
        mode: request.mode,
        outcome: GenerationOutcome::Failed("not generated".to_string()),
        files: 0,
        segments: 0,
        index: IndexStats::default(),
        prompt_tokens: deps.composer.tokenizer().count(&prompt),
        published_pr: None,
    };

    report.outcome = match request.mode {
        RetrievalMode::Direct => {
            tracker.enter(PipelineStage::Ready);
            tracker.enter(PipelineStage::Generating);
            deps.generator
                .generate::<InMemoryIndex>(&prompt, None)
                .await
        }
        RetrievalMode::Rag => {
            tracker.enter(PipelineStage::Materializing);
            let tree = source
                .list_tree("")
                .await
                .context("failed to list repository root")?;
            let materializer = Materializer::new(
                source,
                config.scratch.root.clone(),
                &config.retrieval.exclude_globs,
                config.github.fetch_concurrency,
            )?;
            let session = materializer.materialize(tree, &request.identity).await?;
            report.files = session.files().len();

            tracker.enter(PipelineStage::Chunking);
            let segments = chunk_files(session.files(), &chunk_params);
            report.segments = segments.len();

            tracker.enter(PipelineStage::Indexing);
            let (index, stats) = build_index::<InMemoryIndex>(
                segments,
                deps.embedder.as_ref(),
                config.embedding.batch_size,
            )
            .await;
            info!(
                run = %request.identity,
                indexed = stats.indexed,
                dropped = stats.dropped,
                "index built"
            );
            report.index = stats;

            tracker.enter(PipelineStage::Ready);
            let retriever = Retriever::new(index, deps.embedder.clone());

            tracker.enter(PipelineStage::Generating);
            let outcome = deps.generator.generate(&prompt, Some(&retriever)).await;

            drop(retriever);
            session.release()?;
            outcome
        }
    };

    if request.publish {
        if let GenerationOutcome::Success(text) = &report.outcome {
            if text.trim() == readme.content.trim() {
                info!(run = %request.identity, "README unchanged, nothing to publish");
            } else {
                let publisher = publisher
                    .ok_or_else(|| anyhow!("publishing requested but no publisher available"))?;
                let number =
                    publish_readme_update(publisher, &config.github.readme_path, &readme, text)
                        .await?;
                report.published_pr = Some(number);
            }
        }
    }

    tracker.enter(PipelineStage::Done);
    report.stage = PipelineStage::Done;
    Ok(report)
}
