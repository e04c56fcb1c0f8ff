use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::device::DeviceAvailability;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmailInput {
    pub subject: String,
    pub body: String,
}

impl EmailInput {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Text fed to the model: subject and body joined by a single space.
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.subject, self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailResult {
    pub classifications: Vec<ClassificationResult>,
}

impl EmailResult {
    pub fn top(&self) -> Option<&ClassificationResult> {
        self.classifications.first()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub emails: Vec<EmailInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<EmailResult>,
    #[serde(rename = "total_emails")]
    pub total_count: usize,
    #[serde(rename = "processing_time_ms")]
    pub elapsed_ms: f64,
}

/// Static facts about the loaded artifact, reported by `/model-info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub model_type: String,
    pub num_labels: usize,
    pub labels: BTreeMap<String, u32>,
    pub device: String,
    pub model_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_loaded: bool,
    pub device: String,
    pub device_available: DeviceAvailability,
}
