//! Token counting and token-exact truncation.
//!
//! Prompt budgets are measured in the generation model's own tokens. The
//! [`Tokenizer`] trait abstracts the encoder; [`BpeTokenizer`] wraps the
//! tiktoken BPE tables for OpenAI models.

use anyhow::Result;
use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};
use tracing::debug;

/// Encoder/decoder for a model's token space.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<usize>;

    fn decode(&self, tokens: &[usize]) -> Result<String>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// tiktoken byte-pair encoder.
pub struct BpeTokenizer {
    bpe: CoreBPE,
    model: String,
}

impl BpeTokenizer {
    /// Resolve the encoding used by `model`, falling back to `cl100k_base`
    /// for model names tiktoken does not know.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                debug!(model, error = %e, "unknown tokenizer model, using cl100k_base");
                cl100k_base()?
            }
        };
        Ok(Self {
            bpe,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<usize> {
        self.bpe.encode_with_special_tokens(text)
    }

    fn decode(&self, tokens: &[usize]) -> Result<String> {
        self.bpe.decode(tokens.to_vec())
    }
}

/// Keep the first `max_tokens` tokens of `text`.
///
/// Text already within budget is returned unchanged. Otherwise the prefix
/// is decoded; if the cut lands inside a multi-byte character, or the
/// decoded prefix re-encodes to more than `max_tokens` tokens, the cut
/// moves back one token at a time until both hold.
pub fn truncate_to_tokens(tokenizer: &dyn Tokenizer, text: &str, max_tokens: usize) -> String {
    let tokens = tokenizer.encode(text);
    if tokens.len() <= max_tokens {
        return text.to_string();
    }

    let mut keep = max_tokens;
    while keep > 0 {
        if let Ok(prefix) = tokenizer.decode(&tokens[..keep]) {
            if tokenizer.count(&prefix) <= max_tokens {
                return prefix;
            }
        }
        keep -= 1;
    }
    String::new()
}
