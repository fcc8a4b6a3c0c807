//! Generation client.
//!
//! [`GenerationClient`] sends a composed prompt to a [`GenerationBackend`]
//! and reports the result as a [`GenerationOutcome`]. Backend errors,
//! timeouts and empty answers never propagate: they are logged and come
//! back as [`GenerationOutcome::Failed`].
//!
//! # Modes
//!
//! - **Direct**: the prompt is sent as is.
//! - **RAG**: the prompt is used as the retrieval query, the top-k segments
//!   are stuffed (up to `max_context_tokens`) into the context/question
//!   template, and the filled template is sent.
//!
//! Model, temperature, limits and the API key are fixed at construction.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use readme_rag_core::retrieve::Retriever;
use readme_rag_core::store::VectorIndex;
use readme_rag_core::tokens::{truncate_to_tokens, Tokenizer};
use readme_rag_core::PipelineError;

use crate::config::{GenerationConfig, Secrets};
use crate::traits::{CompletionRequest, GenerationBackend};

const RAG_TEMPLATE_HEAD: &str = "You are an AI trained to update README files based on code changes and repository context. \
Use the following pieces of context to help you understand the repository better:\n";

const RAG_TEMPLATE_TASK: &str = "\n\nNow, please address the following task:\n";

const RAG_TEMPLATE_TAIL: &str = "\nIf you need to refer to specific parts of the codebase or documentation that aren't \
directly mentioned in the context or question, you can ask for more information.";

/// Result of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success(String),
    Failed(String),
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success(_))
    }

    /// The generated text; `None` when generation failed.
    pub fn into_text(self) -> Option<String> {
        match self {
            GenerationOutcome::Success(text) => Some(text),
            GenerationOutcome::Failed(_) => None,
        }
    }
}

pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    config: GenerationConfig,
    tokenizer: Arc<dyn Tokenizer>,
    top_k: usize,
}

impl GenerationClient {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        config: GenerationConfig,
        tokenizer: Arc<dyn Tokenizer>,
        top_k: usize,
    ) -> Self {
        Self {
            backend,
            config,
            tokenizer,
            top_k,
        }
    }

    /// Generate from `prompt`, in RAG mode when `retriever` is given.
    pub async fn generate<I: VectorIndex>(
        &self,
        prompt: &str,
        retriever: Option<&Retriever<I>>,
    ) -> GenerationOutcome {
        let final_prompt = match retriever {
            Some(retriever) => {
                let segments = retriever.retrieve(prompt, self.top_k).await;
                debug!(retrieved = segments.len(), "stuffing retrieved context");
                let context = segments
                    .iter()
                    .map(|s| s.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let context = truncate_to_tokens(
                    self.tokenizer.as_ref(),
                    &context,
                    self.config.max_context_tokens,
                );
                rag_prompt(&context, prompt)
            }
            None => prompt.to_string(),
        };

        let request = CompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            prompt: final_prompt,
        };

        let limit = Duration::from_secs(self.config.timeout_secs);
        let result = match tokio::time::timeout(limit, self.backend.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("timed out after {}s", self.config.timeout_secs)),
        };

        match result {
            Ok(text) if !text.trim().is_empty() => {
                info!(chars = text.len(), model = %request.model, "generation succeeded");
                GenerationOutcome::Success(text)
            }
            Ok(_) => fail("backend returned no text".to_string()),
            Err(e) => fail(format!("{:#}", e)),
        }
    }
}

fn fail(reason: String) -> GenerationOutcome {
    warn!("{}", PipelineError::Generation(reason.clone()));
    GenerationOutcome::Failed(reason)
}

/// Fill the context/question template.
pub fn rag_prompt(context: &str, question: &str) -> String {
    format!(
        "{}{}{}{}{}",
        RAG_TEMPLATE_HEAD, context, RAG_TEMPLATE_TASK, question, RAG_TEMPLATE_TAIL
    )
}

// ============ OpenAI chat completions ============

/// [`GenerationBackend`] over the OpenAI chat completions API.
pub struct OpenAIChatBackend {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatBackend {
    pub fn new(config: &GenerationConfig, secrets: &Secrets) -> Result<Self> {
        let api_key = secrets
            .openai_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            api_url: config.api_url.clone(),
            api_key,
            client,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationBackend for OpenAIChatBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &request.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
        };
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await
            .context("failed to call OpenAI chat completions")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("OpenAI returned {}: {}", status, text);
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .context("failed to parse OpenAI response")?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("OpenAI response had no message content"))
    }
}
