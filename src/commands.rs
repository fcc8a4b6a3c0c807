//! CLI command implementations.
//!
//! Results go to stdout (the generated README, lists, chunk tables);
//! progress and summaries go to stderr so stdout can be piped.

use anyhow::{Context, Result};
use std::path::Path;

use readme_rag_core::chunk::chunk_text;
use readme_rag_core::tokens::{BpeTokenizer, Tokenizer};

use crate::config::{Config, RetrievalMode, Secrets};
use crate::connector_github::{parse_repo, GitHubClient};
use crate::generate::GenerationOutcome;
use crate::pipeline::{run_pipeline, PipelineDeps, PipelineRequest};

/// `readme-rag generate <owner/repo> <pr>`
pub async fn run_generate(
    config: &Config,
    secrets: &Secrets,
    repo: &str,
    pr_number: u64,
    publish: bool,
    direct: bool,
) -> Result<()> {
    let mut config = config.clone();
    if direct {
        config.retrieval.mode = RetrievalMode::Direct;
    }
    if publish {
        config.publish.enabled = true;
    }

    let repo_ref = parse_repo(repo)?;
    let github = GitHubClient::new(&config.github, secrets)?;
    let deps = PipelineDeps::from_config(config, secrets)?;
    let source = github.repository(repo_ref.clone(), &deps.config.github);
    let request = PipelineRequest::new(&repo_ref.to_string(), pr_number, &deps.config);

    let report = run_pipeline(&deps, &source, Some(&source), &request).await?;

    eprintln!("generate {} (mode: {:?})", request.identity, report.mode);
    if report.mode == RetrievalMode::Rag {
        eprintln!("  files:     {}", report.files);
        eprintln!("  segments:  {}", report.segments);
        eprintln!(
            "  indexed:   {} ({} dropped)",
            report.index.indexed, report.index.dropped
        );
    }
    eprintln!("  prompt:    {} tokens", report.prompt_tokens);
    if let Some(pr) = report.published_pr {
        eprintln!("  opened:    pull request #{}", pr);
    }

    match report.outcome {
        GenerationOutcome::Success(text) => println!("{}", text),
        GenerationOutcome::Failed(reason) => eprintln!("No update produced: {}", reason),
    }
    Ok(())
}

/// `readme-rag search-repos <query>`
pub async fn run_search_repos(config: &Config, secrets: &Secrets, query: &str) -> Result<()> {
    let github = GitHubClient::new(&config.github, secrets)?;
    for name in github.search_repositories(query).await? {
        println!("{}", name);
    }
    Ok(())
}

/// `readme-rag list-prs <owner/repo>`
pub async fn run_list_prs(config: &Config, secrets: &Secrets, repo: &str) -> Result<()> {
    let repo = parse_repo(repo)?;
    let github = GitHubClient::new(&config.github, secrets)?;
    for number in github.list_pull_requests(&repo).await? {
        println!("{}", number);
    }
    Ok(())
}

/// `readme-rag chunk <file>`: chunker dry run over a local file.
pub fn run_chunk(config: &Config, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let params = config.chunking.params()?;
    let tokenizer = BpeTokenizer::for_model(&config.prompt.tokenizer_model)?;

    let label = path.to_string_lossy();
    let segments = chunk_text(&label, &text, &params);

    println!(
        "chunk {} (size {}, overlap {}, min_chunk {})",
        label,
        params.chunk_size(),
        params.overlap(),
        params.min_chunk()
    );
    for segment in &segments {
        println!(
            "  #{:<4} {:>6} chars {:>6} tokens",
            segment.index,
            segment.text.chars().count(),
            tokenizer.count(&segment.text)
        );
    }
    println!("  segments: {}", segments.len());
    Ok(())
}
