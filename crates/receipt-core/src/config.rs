use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Top-level configuration, loaded from an optional TOML file merged with
/// `RECEIPT_`-prefixed environment variables (env wins).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    pub api_id: i32,
    pub api_hash: String,
    #[serde(default = "default_session_dir")]
    pub session_dir: String,
}

fn default_session_dir() -> String {
    "~/.receipt-pipeline/session".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "~/.receipt-pipeline/receipts.db".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ModelConfig {
    /// Absent disables both the model-text and model-vision parsing stages.
    pub api_key: Option<String>,
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub text_model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
}

fn default_model_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_catchup_interval")]
    pub catchup_interval_sec: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_text_confidence_threshold")]
    pub text_confidence_threshold: f64,
    #[serde(default = "default_resolver_confidence_threshold")]
    pub resolver_confidence_threshold: f64,
}

fn default_timezone() -> String {
    "Asia/Tashkent".to_string()
}

fn default_catchup_interval() -> u64 {
    45
}

const CATCHUP_INTERVAL_FLOOR_SEC: u64 = 15;

fn default_workers() -> usize {
    2
}

fn default_text_confidence_threshold() -> f64 {
    0.8
}

fn default_resolver_confidence_threshold() -> f64 {
    0.75
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            catchup_interval_sec: default_catchup_interval(),
            workers: default_workers(),
            text_confidence_threshold: default_text_confidence_threshold(),
            resolver_confidence_threshold: default_resolver_confidence_threshold(),
        }
    }
}

impl PipelineConfig {
    /// Catch-up interval, floored at 15s per the capture layer's contract.
    pub fn catchup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.catchup_interval_sec.max(CATCHUP_INTERVAL_FLOOR_SEC))
    }
}

impl AppConfig {
    /// Load config from an optional TOML file, overridden by `RECEIPT_*` env vars.
    ///
    /// File first, env wins; double-underscore splits into nested keys
    /// (`RECEIPT_CHAT__API_ID`).
    pub fn load(config_path: Option<&str>) -> Result<Self, CoreError> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("RECEIPT_").split("__"));
        figment
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}
