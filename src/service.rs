use std::path::PathBuf;
use std::sync::Arc;

use crate::batch::BatchRun;
use crate::device::{self, DeviceKind};
use crate::engine::{SequenceClassifier, rank};
use crate::error::InferenceError;
use crate::preprocess::EmailTransform;
use crate::truncate::Truncator;
use crate::types::{BatchResult, EmailInput, EmailResult, HealthReport, ModelInfo};

/// A model ready to serve: classifier, the tokenizer-backed truncator that
/// matches it, and where it was loaded from.
pub struct LoadedModel {
    pub classifier: Arc<dyn SequenceClassifier>,
    pub truncator: Truncator,
    pub device: DeviceKind,
    pub model_path: PathBuf,
}

/// Application context shared by every request handler.
///
/// Built once at startup; nothing in the request path mutates it.
pub struct ClassificationService {
    model: Option<LoadedModel>,
    preprocessor: Arc<dyn EmailTransform>,
}

impl ClassificationService {
    pub fn new(preprocessor: Arc<dyn EmailTransform>) -> Self {
        Self {
            model: None,
            preprocessor,
        }
    }

    pub fn with_model(mut self, model: LoadedModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn model(&self) -> Result<&LoadedModel, InferenceError> {
        self.model.as_ref().ok_or(InferenceError::ServiceUnavailable)
    }

    pub fn classify(
        &self,
        subject: &str,
        body: &str,
        show_all_scores: bool,
    ) -> Result<EmailResult, InferenceError> {
        self.classify_email(&EmailInput::new(subject, body), show_all_scores)
    }

    /// Preprocess, truncate to the token budget, score every label, rank.
    #[tracing::instrument(skip(self, email))]
    pub fn classify_email(
        &self,
        email: &EmailInput,
        show_all_scores: bool,
    ) -> Result<EmailResult, InferenceError> {
        let model = self.model()?;

        let processed = self.preprocessor.transform(email.clone());
        let text = model.truncator.truncate(&processed.combined_text())?;
        let scores = model
            .classifier
            .predict(&text)
            .map_err(InferenceError::ClassificationFailure)?;

        let classifications = rank(scores, show_all_scores);
        let result = EmailResult { classifications };
        if let Some(top) = result.top() {
            tracing::debug!(label = %top.label, score = top.score, "Email classified");
        }
        Ok(result)
    }

    pub fn classify_batch(
        &self,
        emails: &[EmailInput],
        show_all_scores: bool,
    ) -> Result<BatchResult, InferenceError> {
        self.model()?;
        let mut run = BatchRun::new(emails);
        let outcome = run.run(|email| self.classify_email(email, show_all_scores));
        tracing::debug!(state = ?run.state(), "Batch finished");
        outcome
    }

    pub fn model_info(&self) -> Result<ModelInfo, InferenceError> {
        let model = self.model()?;
        let descriptor = model.classifier.descriptor();

        Ok(ModelInfo {
            model_name: model
                .model_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            model_type: descriptor.model_type.clone(),
            num_labels: descriptor.num_labels(),
            labels: descriptor.label2id.clone(),
            device: model.device.to_string(),
            model_path: model.model_path.display().to_string(),
        })
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            model_loaded: self.is_loaded(),
            device: self
                .model
                .as_ref()
                .map(|model| model.device)
                .unwrap_or(DeviceKind::Cpu)
                .to_string(),
            device_available: device::availability(),
        }
    }
}
