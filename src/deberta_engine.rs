use anyhow::{Result, anyhow};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_nn::ops::softmax;
use candle_transformers::models::debertav2::{
    Config as DebertaV2Config, DebertaV2SeqClassificationModel, Id2Label,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};

use crate::device::{self, DeviceProbe, SelectedDevice};
use crate::engine::{ModelDescriptor, SequenceClassifier};
use crate::error::InferenceError;
use crate::service::LoadedModel;
use crate::truncate::{DEFAULT_MAX_TOKENS, Truncator};
use crate::types::ClassificationResult;

const SUPPORTED_MODEL_TYPE: &str = "deberta-v2";

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub use_pth: bool,
    pub cpu: bool,
    pub max_sequence_length: usize,
    pub id2label: Option<HashMap<u32, String>>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/email_classifier_final"),
            use_pth: false,
            cpu: false,
            max_sequence_length: DEFAULT_MAX_TOKENS,
            id2label: None,
        }
    }
}

/// Files that make up a model artifact directory.
#[derive(Debug)]
struct ArtifactFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ArtifactFiles {
    fn locate(base_path: &Path, use_pth: bool) -> Result<Self, InferenceError> {
        if !base_path.is_dir() {
            return Err(InferenceError::ModelNotFound {
                path: base_path.to_path_buf(),
            });
        }

        let files = Self {
            config: base_path.join("config.json"),
            tokenizer: base_path.join("tokenizer.json"),
            weights: if use_pth {
                base_path.join("pytorch_model.bin")
            } else {
                base_path.join("model.safetensors")
            },
        };

        for file in [&files.config, &files.tokenizer, &files.weights] {
            if !file.is_file() {
                return Err(InferenceError::load(format!(
                    "missing artifact file {}",
                    file.display()
                )));
            }
        }
        Ok(files)
    }
}

/// Parsed `config.json`: the raw architecture config plus the fields the
/// service reports on.
struct ArtifactConfig {
    model_type: String,
    model: DebertaV2Config,
}

impl ArtifactConfig {
    fn read(path: &Path) -> Result<Self, InferenceError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| InferenceError::load(format!("reading {}: {e}", path.display())))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| InferenceError::load(format!("parsing {}: {e}", path.display())))?;

        let model_type = value
            .get("model_type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if model_type != SUPPORTED_MODEL_TYPE {
            return Err(InferenceError::load(format!(
                "unsupported model_type {model_type:?}, expected {SUPPORTED_MODEL_TYPE:?}"
            )));
        }

        let model: DebertaV2Config = serde_json::from_value(value)
            .map_err(|e| InferenceError::load(format!("invalid model config: {e}")))?;
        Ok(Self { model_type, model })
    }
}

/// Override labels take precedence, then the artifact's own `id2label`.
fn resolve_id2label(
    override_labels: Option<HashMap<u32, String>>,
    artifact_labels: Option<&Id2Label>,
) -> Result<Id2Label, InferenceError> {
    if let Some(id2label) = override_labels {
        Ok(id2label)
    } else if let Some(id2label) = artifact_labels {
        Ok(id2label.clone())
    } else {
        Err(InferenceError::load(
            "id2label not found in the model configuration nor specified as a parameter",
        ))
    }
}

fn invert_labels(id2label: &Id2Label) -> BTreeMap<String, u32> {
    id2label
        .iter()
        .map(|(id, label)| (label.clone(), *id))
        .collect()
}

pub struct DebertaEngine {
    model: DebertaV2SeqClassificationModel,
    tokenizer: Tokenizer,
    device: Device,
    id2label: Id2Label,
    descriptor: ModelDescriptor,
}

impl DebertaEngine {
    fn label_for(&self, id: usize) -> String {
        self.id2label
            .get(&(id as u32))
            .cloned()
            .unwrap_or_else(|| format!("LABEL_{id}"))
    }
}

impl SequenceClassifier for DebertaEngine {
    #[tracing::instrument(skip(self, text), fields(text_len = text.len()))]
    fn predict(&self, text: &str) -> Result<Vec<ClassificationResult>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenization error: {e}"))?;

        // Batch of one: [1, seq_len]
        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask =
            Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let logits = self
            .model
            .forward(&input_ids, Some(token_type_ids), Some(attention_mask))?;
        let probs = softmax(&logits, 1)?.to_vec2::<f32>()?;
        let row = probs
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Model returned no logits"))?;

        Ok(row
            .into_iter()
            .enumerate()
            .map(|(id, score)| ClassificationResult {
                label: self.label_for(id),
                score,
            })
            .collect())
    }

    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }
}

/// Loads tokenizer and weights from `config.model_path` onto the best device.
#[tracing::instrument(skip(config), fields(model_path = %config.model_path.display(), cpu = config.cpu))]
pub fn load(config: &ModelConfig) -> Result<LoadedModel, InferenceError> {
    load_with_probes(config, &device::default_probes())
}

fn load_with_probes(
    config: &ModelConfig,
    probes: &[Box<dyn DeviceProbe>],
) -> Result<LoadedModel, InferenceError> {
    let files = ArtifactFiles::locate(&config.model_path, config.use_pth)?;
    tracing::info!(model_path = %config.model_path.display(), "Loading model");

    let artifact = ArtifactConfig::read(&files.config)?;
    let id2label = resolve_id2label(config.id2label.clone(), artifact.model.id2label.as_ref())?;

    let tokenizer = Tokenizer::from_file(&files.tokenizer)
        .map_err(|e| InferenceError::load(format!("Tokenizer error: {e}")))?;
    let truncator = Truncator::new(tokenizer.clone(), config.max_sequence_length)?;

    let mut tokenizer = tokenizer;
    tokenizer.with_padding(None);
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: config.max_sequence_length,
            ..Default::default()
        }))
        .map_err(|e| InferenceError::load(format!("Tokenizer truncation error: {e}")))?;

    let SelectedDevice { kind, device } = device::choose_device(config.cpu, probes);

    let dtype = candle_transformers::models::debertav2::DTYPE;
    let vb = if config.use_pth {
        VarBuilder::from_pth(&files.weights, dtype, &device).map_err(InferenceError::load)?
    } else {
        unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], dtype, &device)
                .map_err(InferenceError::load)?
        }
    };

    let vb = vb.set_prefix("deberta");
    let model =
        DebertaV2SeqClassificationModel::load(vb, &artifact.model, Some(id2label.clone()))
            .map_err(InferenceError::load)?;

    let descriptor = ModelDescriptor {
        model_type: artifact.model_type,
        label2id: invert_labels(&id2label),
    };
    tracing::info!(
        device = %kind,
        num_labels = descriptor.num_labels(),
        max_tokens = truncator.max_tokens(),
        "Model loaded successfully"
    );

    let engine = DebertaEngine {
        model,
        tokenizer,
        device,
        id2label,
        descriptor,
    };

    Ok(LoadedModel {
        classifier: Arc::new(engine),
        truncator,
        device: kind,
        model_path: config.model_path.clone(),
    })
}
