use std::time::{Duration, Instant};

use crate::error::InferenceError;
use crate::types::{BatchResult, EmailInput, EmailResult};

pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Processing,
    Complete,
    Failed,
}

/// One pass of the single-email path over a bounded list of emails.
///
/// Items are classified sequentially in input order. The first item error
/// aborts the run: no partial results are returned and the remaining items
/// are never classified.
pub struct BatchRun<'a> {
    emails: &'a [EmailInput],
    state: BatchState,
}

impl<'a> BatchRun<'a> {
    pub fn new(emails: &'a [EmailInput]) -> Self {
        Self {
            emails,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    fn transition(&mut self, next: BatchState) {
        tracing::debug!(from = ?self.state, to = ?next, "Batch state change");
        self.state = next;
    }

    /// Rejects empty and oversized batches. A rejected batch stays `Idle`.
    pub fn validate(&self) -> Result<(), InferenceError> {
        match self.emails.len() {
            0 => Err(InferenceError::InvalidBatch),
            len if len > MAX_BATCH_SIZE => Err(InferenceError::BatchTooLarge {
                len,
                max: MAX_BATCH_SIZE,
            }),
            _ => Ok(()),
        }
    }

    #[tracing::instrument(skip(self, classify_one), fields(batch_size = self.emails.len()))]
    pub fn run<F>(&mut self, mut classify_one: F) -> Result<BatchResult, InferenceError>
    where
        F: FnMut(&EmailInput) -> Result<EmailResult, InferenceError>,
    {
        self.validate()?;

        let batch_start = Instant::now();
        self.transition(BatchState::Processing);

        let mut results = Vec::with_capacity(self.emails.len());
        for (index, email) in self.emails.iter().enumerate() {
            match classify_one(email) {
                Ok(result) => results.push(result),
                Err(err) => {
                    self.transition(BatchState::Failed);
                    tracing::error!(index, error = %err, "Batch classification failed");
                    return Err(InferenceError::BatchClassification {
                        index,
                        source: Box::new(err),
                    });
                }
            }
        }

        let elapsed_ms = round_ms(batch_start.elapsed());
        self.transition(BatchState::Complete);
        tracing::info!(
            total_emails = results.len(),
            elapsed_ms,
            "Batch classification completed"
        );

        Ok(BatchResult {
            total_count: results.len(),
            results,
            elapsed_ms,
        })
    }
}

/// Milliseconds rounded to two decimals.
pub fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}
