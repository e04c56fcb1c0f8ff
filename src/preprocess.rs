use clap::ValueEnum;
use std::sync::Arc;

use crate::types::EmailInput;

/// Normalization applied to a raw email before tokenization.
///
/// Production inference must apply the same transform the model saw at
/// training time, so the policy is injected rather than hardcoded.
pub trait EmailTransform: Send + Sync {
    fn transform(&self, email: EmailInput) -> EmailInput;
}

impl<F> EmailTransform for F
where
    F: Fn(EmailInput) -> EmailInput + Send + Sync,
{
    fn transform(&self, email: EmailInput) -> EmailInput {
        self(email)
    }
}

pub struct Passthrough;

impl EmailTransform for Passthrough {
    fn transform(&self, email: EmailInput) -> EmailInput {
        email
    }
}

/// Trims and collapses every whitespace run to a single space.
pub struct WhitespaceNormalizer;

impl WhitespaceNormalizer {
    fn collapse(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl EmailTransform for WhitespaceNormalizer {
    fn transform(&self, email: EmailInput) -> EmailInput {
        EmailInput {
            subject: Self::collapse(&email.subject),
            body: Self::collapse(&email.body),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PreprocessPolicy {
    #[default]
    None,
    Whitespace,
}

impl PreprocessPolicy {
    pub fn build(self) -> Arc<dyn EmailTransform> {
        match self {
            Self::None => Arc::new(Passthrough),
            Self::Whitespace => Arc::new(WhitespaceNormalizer),
        }
    }
}
