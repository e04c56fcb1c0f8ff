use tokenizers::{Tokenizer, TruncationParams};

use crate::error::InferenceError;

pub const DEFAULT_MAX_TOKENS: usize = 512;

/// Cuts free-form text down to what the model can consume in one pass.
///
/// The text is encoded with truncation at `max_tokens` (special tokens
/// included) and decoded back with special tokens stripped, so the result
/// re-tokenizes within the budget.
#[derive(Clone)]
pub struct Truncator {
    tokenizer: Tokenizer,
    max_tokens: usize,
}

impl Truncator {
    pub fn new(mut tokenizer: Tokenizer, max_tokens: usize) -> Result<Self, InferenceError> {
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::load(format!("Tokenizer truncation error: {e}")))?;

        Ok(Self {
            tokenizer,
            max_tokens,
        })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn truncate(&self, text: &str) -> Result<String, InferenceError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| InferenceError::failure(format!("Tokenization error: {e}")))?;

        self.tokenizer
            .decode(encoding.get_ids(), true)
            .map_err(|e| InferenceError::failure(format!("Detokenization error: {e}")))
    }
}
