//! Token-budgeted prompt composition.
//!
//! Renders the pull-request material into the README-update template and
//! enforces a token budget on the **fully rendered** prompt: when the
//! rendering is too long, only its first `max_tokens` tokens are kept. The
//! template opens with the instructions and the code changes, so
//! truncation eats into trailing sections and never into the preamble.
//!
//! # Template sections
//!
//! 1. Code changes (`File: <name>` / `Diff:` per changed file)
//! 2. Commit messages, one per line
//! 3. Current README
//! 4. Changed file contents (only when present)
//! 5. Related repository context (only when retrieval supplied some)

use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::models::{FileDiff, PromptContext, RepositoryFile};
use crate::tokens::{truncate_to_tokens, Tokenizer};

const PREAMBLE: &str = "You are an AI trained to update README files based on code changes. \
Please review the following information from a GitHub pull request:\n\n";

const INSTRUCTIONS: &str = "Based on the code changes, commit messages, and the current README, \
determine if the README needs to be updated. If so, provide an updated version of the README that:\n\
- Maintains its existing style and clarity\n\
- Reflects new features, changes in functionality, or important updates\n\
- Updates any outdated information\n\
- Adds or modifies sections as necessary to accurately represent the current state of the project\n\n\
If no update is needed, return the original README content.\n\n\
Updated README:\n";

/// Composes prompts against a fixed token budget.
#[derive(Clone)]
pub struct PromptComposer {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
}

impl PromptComposer {
    /// Fails with [`PipelineError::InvalidConfiguration`] when `max_tokens` is 0.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize) -> Result<Self, PipelineError> {
        if max_tokens == 0 {
            return Err(PipelineError::invalid("prompt max_tokens must be > 0"));
        }
        Ok(Self {
            tokenizer,
            max_tokens,
        })
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Render and truncate. Within-budget renderings come back unmodified.
    pub fn compose(&self, ctx: &PromptContext) -> String {
        let rendered = render(ctx);
        truncate_to_tokens(self.tokenizer.as_ref(), &rendered, self.max_tokens)
    }
}

/// One-shot form of [`PromptComposer::compose`].
pub fn compose(
    tokenizer: Arc<dyn Tokenizer>,
    diffs: &[FileDiff],
    commit_messages: &[String],
    readme: &str,
    max_tokens: usize,
    context: Option<&str>,
) -> Result<String, PipelineError> {
    let composer = PromptComposer::new(tokenizer, max_tokens)?;
    let ctx = PromptContext {
        diffs: diffs.to_vec(),
        commit_messages: commit_messages.to_vec(),
        readme_text: readme.to_string(),
        changed_files: Vec::new(),
        retrieved_text: context.map(str::to_string),
    };
    Ok(composer.compose(&ctx))
}

/// Render the template without any budget.
pub fn render(ctx: &PromptContext) -> String {
    let mut out = String::from(PREAMBLE);

    out.push_str("1. Code changes:\n");
    out.push_str(&render_diffs(&ctx.diffs));
    out.push_str("\n\n");

    out.push_str("2. Commit messages:\n");
    out.push_str(&ctx.commit_messages.join("\n"));
    out.push_str("\n\n");

    out.push_str("3. Current README file content:\n");
    out.push_str(&ctx.readme_text);
    out.push_str("\n\n");

    if !ctx.changed_files.is_empty() {
        out.push_str("4. Full contents of the changed files:\n");
        out.push_str(&render_files(&ctx.changed_files));
        out.push_str("\n\n");
    }

    if let Some(retrieved) = ctx.retrieved_text.as_deref().filter(|t| !t.is_empty()) {
        out.push_str("5. Related repository context:\n");
        out.push_str(retrieved);
        out.push_str("\n\n");
    }

    out.push_str(INSTRUCTIONS);
    out
}

fn render_diffs(diffs: &[FileDiff]) -> String {
    diffs
        .iter()
        .map(|d| {
            format!(
                "File: {}\nDiff: \n{}\n",
                d.filename,
                d.patch.as_deref().unwrap_or("(no textual diff)")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_files(files: &[RepositoryFile]) -> String {
    let mut out = String::new();
    for f in files {
        let _ = writeln!(out, "File: {}\n{}", f.path, f.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::BpeTokenizer;

    fn tokenizer() -> Arc<dyn Tokenizer> {
        Arc::new(BpeTokenizer::for_model("gpt-4").unwrap())
    }

    fn sample_ctx() -> PromptContext {
        PromptContext {
            diffs: vec![FileDiff {
                filename: "src/lib.rs".to_string(),
                patch: Some("+pub fn hello() {}".to_string()),
            }],
            commit_messages: vec!["Add hello".to_string(), "Fix typo".to_string()],
            readme_text: "# Demo\n\nA demo crate.".to_string(),
            changed_files: Vec::new(),
            retrieved_text: None,
        }
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(
            PromptComposer::new(tokenizer(), 0),
            Err(PipelineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_render_contains_all_fields_in_order() {
        let text = render(&sample_ctx());
        let diff_at = text.find("File: src/lib.rs\nDiff: \n+pub fn hello() {}").unwrap();
        let commits_at = text.find("Add hello\nFix typo").unwrap();
        let readme_at = text.find("# Demo").unwrap();
        assert!(text.starts_with("You are an AI trained to update README files"));
        assert!(diff_at < commits_at && commits_at < readme_at);
        assert!(text.ends_with("Updated README:\n"));
        assert!(!text.contains("5. Related repository context"));
    }

    #[test]
    fn test_optional_sections() {
        let mut ctx = sample_ctx();
        ctx.retrieved_text = Some("fn main() {}".to_string());
        ctx.changed_files = vec![RepositoryFile::unreadable("big.bin", "binary")];
        let text = render(&ctx);
        assert!(text.contains("4. Full contents of the changed files:\nFile: big.bin\nError fetching file content: binary"));
        assert!(text.contains("5. Related repository context:\nfn main() {}"));
    }

    #[test]
    fn test_within_budget_returns_rendering() {
        let composer = PromptComposer::new(tokenizer(), 10_000).unwrap();
        let ctx = sample_ctx();
        assert_eq!(composer.compose(&ctx), render(&ctx));
    }

    #[test]
    fn test_over_budget_keeps_leading_tokens() {
        let tok = tokenizer();
        let ctx = PromptContext {
            commit_messages: vec!["the cat sat on the mat. ".repeat(40)],
            readme_text: "# Demo".to_string(),
            ..Default::default()
        };
        let rendered = render(&ctx);
        assert!(tok.count(&rendered) > 50);

        let composer = PromptComposer::new(tok.clone(), 50).unwrap();
        let out = composer.compose(&ctx);
        assert_eq!(tok.count(&out), 50);
        let tokens = tok.encode(&rendered);
        assert_eq!(out, tok.decode(&tokens[..50]).unwrap());
        assert!(out.starts_with("You are an AI trained"));
    }

    #[test]
    fn test_compose_function_with_context() {
        let out = compose(
            tokenizer(),
            &[],
            &["msg".to_string()],
            "readme",
            4000,
            Some("ctx text"),
        )
        .unwrap();
        assert!(out.contains("5. Related repository context:\nctx text"));
        assert!(compose(tokenizer(), &[], &[], "r", 0, None).is_err());
    }
}
