//! Configuration parsing and validation.
//!
//! readme-rag is configured through a TOML file. Every section and field
//! has a default, so an empty file (or [`Config::default`]) is valid:
//! embeddings are disabled, which is enough for `--direct` runs and the
//! read-only commands. A RAG run without an embedding provider is
//! rejected per request by the pipeline, not here. [`load_config`] parses
//! and then runs [`Config::validate`]; invalid settings surface as
//! [`PipelineError::InvalidConfiguration`] before any I/O happens.
//!
//! Secrets are not part of the file. [`Secrets::from_env`] reads them once
//! at startup and the binary threads them into the clients that need them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use readme_rag_core::chunk::ChunkParams;
use readme_rag_core::PipelineError;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub prompt: PromptConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub github: GitHubConfig,
    pub publish: PublishConfig,
    pub scratch: ScratchConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Segment length in characters.
    pub chunk_size: usize,
    pub overlap: usize,
    /// Trailing remainders shorter than this are folded into the last segment.
    pub min_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 0,
            min_chunk: 0,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> Result<ChunkParams, PipelineError> {
        ChunkParams::with_min_chunk(self.chunk_size, self.overlap, self.min_chunk)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Snapshot, chunk, and index the repository; retrieve context for generation.
    #[default]
    Rag,
    /// Prompt from the pull request alone.
    Direct,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,
    pub top_k: usize,
    /// Repository paths never materialized or indexed.
    pub exclude_globs: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Rag,
            top_k: 4,
            exclude_globs: default_exclude_globs(),
        }
    }
}

fn default_exclude_globs() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/*.lock".to_string(),
        "**/package-lock.json".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub max_tokens: usize,
    pub tokenizer_model: String,
    pub include_changed_files: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_tokens: 3000,
            tokenizer_model: "gpt-4".to_string(),
            include_changed_files: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Ollama base URL, or an OpenAI-compatible embeddings endpoint.
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    /// Completion length limit passed to the backend.
    pub max_tokens: usize,
    pub timeout_secs: u64,
    /// Token budget for retrieved context stuffed into a RAG-mode request.
    /// It comes on top of `[prompt] max_tokens` and the template text, so a
    /// RAG request can run up to this many tokens past the prompt budget.
    pub max_context_tokens: usize,
    pub api_url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: 120,
            max_context_tokens: 1500,
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub base_branch: String,
    pub readme_path: String,
    /// Maximum file fetches in flight during a snapshot.
    pub fetch_concurrency: usize,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            base_branch: "main".to_string(),
            readme_path: "README.md".to_string(),
            fetch_concurrency: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PublishConfig {
    /// Open a pull request with the updated README after generation.
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScratchConfig {
    /// Parent directory for per-run scratch sessions.
    pub root: PathBuf,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("readme-rag"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl Config {
    /// Check every constraint the pipeline relies on.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.chunking.params()?;

        if self.prompt.max_tokens == 0 {
            return Err(PipelineError::invalid("prompt.max_tokens must be > 0"));
        }
        if self.retrieval.top_k == 0 {
            return Err(PipelineError::invalid("retrieval.top_k must be >= 1"));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(PipelineError::invalid(
                "generation.temperature must be in [0.0, 2.0]",
            ));
        }
        if self.github.fetch_concurrency == 0 {
            return Err(PipelineError::invalid(
                "github.fetch_concurrency must be >= 1",
            ));
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => {
                return Err(PipelineError::invalid(format!(
                    "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                    other
                )))
            }
        }

        if self.embedding.is_enabled() {
            if self.embedding.model.is_none() {
                return Err(PipelineError::invalid(format!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                )));
            }
            if self.embedding.dims == Some(0) {
                return Err(PipelineError::invalid("embedding.dims must be > 0"));
            }
        }

        Ok(())
    }

    /// A configuration that runs without embeddings.
    pub fn direct() -> Self {
        let mut config = Self::default();
        config.retrieval.mode = RetrievalMode::Direct;
        config
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Credentials read from the process environment once at startup.
#[derive(Clone, Default)]
pub struct Secrets {
    pub github_token: Option<String>,
    pub openai_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            github_token: read("GITHUB_TOKEN"),
            openai_api_key: read("OPENAI_API_KEY"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_empty_configs_are_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::direct().validate().is_ok());

        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.retrieval.mode, RetrievalMode::Rag);
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn test_parse_full_config() {
        let cfg = parse_config(
            r#"
[chunking]
chunk_size = 800
overlap = 100

[retrieval]
mode = "rag"
top_k = 6

[prompt]
max_tokens = 2500

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536

[generation]
model = "gpt-4o"
temperature = 0.2

[server]
bind = "0.0.0.0:9000"
"#,
        )
        .unwrap();
        assert_eq!(cfg.chunking.chunk_size, 800);
        assert_eq!(cfg.chunking.overlap, 100);
        assert_eq!(cfg.retrieval.top_k, 6);
        assert_eq!(cfg.prompt.max_tokens, 2500);
        assert_eq!(cfg.prompt.tokenizer_model, "gpt-4");
        assert_eq!(cfg.embedding.batch_size, 64);
        assert_eq!(cfg.generation.model, "gpt-4o");
        assert_eq!(cfg.github.readme_path, "README.md");
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert_eq!(cfg.server.allowed_origins, vec!["http://localhost:5173"]);
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = parse_config(include_str!("../config/readme-rag.example.toml")).unwrap();
        assert_eq!(cfg.retrieval.mode, RetrievalMode::Rag);
        assert_eq!(cfg.embedding.dims, Some(1536));
        assert_eq!(cfg.retrieval.exclude_globs, default_exclude_globs());
    }

    #[test]
    fn test_overlap_not_below_chunk_size_rejected() {
        let err = parse_config(
            "[retrieval]\nmode = \"direct\"\n[chunking]\nchunk_size = 100\noverlap = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_zero_prompt_budget_rejected() {
        let err = parse_config("[retrieval]\nmode = \"direct\"\n[prompt]\nmax_tokens = 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse_config("[embedding]\nprovider = \"magic\"\nmodel = \"m\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(parse_config("[retrieval]\nmode = \"hybrid\"\n").is_err());
    }

    #[test]
    fn test_secrets_debug_redacts() {
        let s = Secrets {
            github_token: Some("ghp_secret".to_string()),
            openai_api_key: None,
        };
        let shown = format!("{:?}", s);
        assert!(!shown.contains("ghp_secret"));
        assert!(shown.contains("***"));
    }
}
