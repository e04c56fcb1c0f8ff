use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::deberta_engine::ModelConfig;
use crate::preprocess::PreprocessPolicy;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Local path to the model artifact directory
    #[arg(long, env = "MODEL_PATH", default_value = "models/email_classifier_final")]
    pub model_path: PathBuf,

    /// Use PyTorch weights instead of safetensors
    #[arg(long, env = "USE_PTH")]
    pub use_pth: bool,

    /// Run on CPU instead of GPU
    #[arg(long, env = "CPU_ONLY")]
    pub cpu_only: bool,

    /// Maximum sequence length allowed
    #[arg(long, env = "MAX_SEQUENCE_LENGTH", default_value = "512")]
    pub max_sequence_length: usize,

    /// Labels mapping in format "0=billing,1=support"
    #[arg(long, env = "ID2LABEL")]
    pub id2label: Option<String>,

    /// Normalization applied to emails before tokenization
    #[arg(long, env = "PREPROCESS", value_enum, default_value = "none")]
    pub preprocess: PreprocessPolicy,

    /// Bearer token required on API routes; empty disables authentication
    #[arg(long, env = "API_SECRET_TOKEN", default_value = "", hide_env_values = true)]
    pub api_secret_token: String,

    /// Path prefix all routes are served under
    #[arg(long, env = "ROOT_PATH", default_value = "")]
    pub root_path: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl From<&Config> for ModelConfig {
    fn from(config: &Config) -> Self {
        Self {
            model_path: config.model_path.clone(),
            use_pth: config.use_pth,
            cpu: config.cpu_only,
            max_sequence_length: config.max_sequence_length,
            id2label: config.parse_id2label(),
        }
    }
}

impl Config {
    pub fn parse_id2label(&self) -> Option<HashMap<u32, String>> {
        self.id2label.as_ref().map(|labels| {
            labels
                .split(',')
                .filter_map(|pair| {
                    let mut parts = pair.split('=');
                    let id = parts.next()?.trim().parse().ok()?;
                    let label = parts.next()?.trim().to_string();
                    Some((id, label))
                })
                .collect()
        })
    }

    pub fn api_token(&self) -> Option<String> {
        Some(self.api_secret_token.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }

    /// `ROOT_PATH` normalized to `/prefix` form, or `None` when unset.
    pub fn route_prefix(&self) -> Option<String> {
        let trimmed = self.root_path.trim().trim_matches('/');
        (!trimmed.is_empty()).then(|| format!("/{trimmed}"))
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["email-classifier"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn id2label_pairs_are_parsed() {
        let config = parse(&["--id2label", "0=billing, 1=support,bogus,2=sales"]);
        let labels = config.parse_id2label().unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[&0], "billing");
        assert_eq!(labels[&1], "support");
        assert_eq!(labels[&2], "sales");
    }

    #[test]
    fn model_config_follows_cli() {
        let config = parse(&[
            "--model-path",
            "/srv/models/mail",
            "--cpu-only",
            "--max-sequence-length",
            "256",
        ]);
        let model = ModelConfig::from(&config);
        assert_eq!(model.model_path, PathBuf::from("/srv/models/mail"));
        assert!(model.cpu);
        assert_eq!(model.max_sequence_length, 256);
        assert!(model.id2label.is_none());
    }

    #[test]
    fn route_prefix_is_normalized() {
        assert_eq!(
            parse(&["--root-path", "api/v1/"]).route_prefix().as_deref(),
            Some("/api/v1")
        );
        assert_eq!(parse(&["--root-path", "/"]).route_prefix(), None);
    }

    #[test]
    fn blank_token_disables_auth() {
        assert_eq!(parse(&["--api-secret-token", "  "]).api_token(), None);
        assert_eq!(
            parse(&["--api-secret-token", "s3cret"]).api_token().as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn preprocess_policy_is_selectable() {
        assert_eq!(
            parse(&["--preprocess", "whitespace"]).preprocess,
            PreprocessPolicy::Whitespace
        );
    }
}
