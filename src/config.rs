use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ChatGraphError, Result};
use crate::types::VisualizationControls;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatGraphConfig {
    // Embedding provider selection
    #[serde(default)]
    pub embedding_mode: EmbeddingMode,
    #[serde(default)]
    pub embedding_api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    // Remote request pacing
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_jitter_ms")]
    pub retry_max_jitter_ms: u64,

    // Embedding text budget
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,
    #[serde(default = "default_max_key_messages")]
    pub max_key_messages: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "default_max_embedding_text_chars")]
    pub max_embedding_text_chars: usize,

    // Normalization
    #[serde(default = "default_min_messages")]
    pub min_messages: usize,
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    #[serde(default = "default_topic_count")]
    pub topic_count: usize,
    #[serde(default = "default_min_topic_word_len")]
    pub min_topic_word_len: usize,

    // Graph
    #[serde(default)]
    pub default_controls: VisualizationControls,
}

/// Which embedding provider the orchestrator is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Remote,
    Offline,
}

impl Default for EmbeddingMode {
    fn default() -> Self {
        EmbeddingMode::Remote
    }
}

impl std::fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingMode::Remote => write!(f, "remote"),
            EmbeddingMode::Offline => write!(f, "offline"),
        }
    }
}

impl Default for ChatGraphConfig {
    fn default() -> Self {
        Self {
            embedding_mode: EmbeddingMode::default(),
            embedding_api_key: None,
            embedding_model: default_embedding_model(),
            embedding_base_url: default_embedding_base_url(),
            embedding_dimension: default_embedding_dimension(),
            embed_batch_size: default_embed_batch_size(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_jitter_ms: default_retry_max_jitter_ms(),
            max_title_chars: default_max_title_chars(),
            max_summary_chars: default_max_summary_chars(),
            max_key_messages: default_max_key_messages(),
            max_message_chars: default_max_message_chars(),
            max_embedding_text_chars: default_max_embedding_text_chars(),
            min_messages: default_min_messages(),
            min_word_count: default_min_word_count(),
            summary_max_chars: default_summary_max_chars(),
            topic_count: default_topic_count(),
            min_topic_word_len: default_min_topic_word_len(),
            default_controls: VisualizationControls::default(),
        }
    }
}

pub const API_KEY_ENV: &str = "CHATGRAPH_API_KEY";
pub const LEGACY_API_KEY_ENV: &str = "GOOGLE_AI_API_KEY";
pub const OFFLINE_ENV: &str = "CHATGRAPH_OFFLINE";

impl ChatGraphConfig {
    /// Offline configuration for demos and tests. No credential needed.
    pub fn offline() -> Self {
        Self {
            embedding_mode: EmbeddingMode::Offline,
            ..Default::default()
        }
    }

    /// Defaults plus whatever the process environment provides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.embedding_api_key = std::env::var(API_KEY_ENV)
            .or_else(|_| std::env::var(LEGACY_API_KEY_ENV))
            .ok()
            .filter(|key| !key.trim().is_empty());

        if let Ok(flag) = std::env::var(OFFLINE_ENV) {
            if matches!(flag.trim(), "1" | "true" | "yes") {
                config.embedding_mode = EmbeddingMode::Offline;
            }
        }

        config
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: ChatGraphConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Fails with a configuration error when remote mode lacks a usable key.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_mode == EmbeddingMode::Offline {
            return Ok(());
        }

        if self.embed_batch_size == 0 {
            return Err(ChatGraphError::Configuration(
                "embed_batch_size must be at least 1".to_string(),
            ));
        }

        match self.embedding_api_key.as_deref() {
            None => Err(ChatGraphError::Configuration(format!(
                "embedding API key is not configured; set {} or enable offline mode",
                API_KEY_ENV
            ))),
            Some(key) if !is_valid_api_key(key) => Err(ChatGraphError::Configuration(
                "embedding API key is malformed; expected a Google AI key starting with 'AIza'"
                    .to_string(),
            )),
            Some(_) => Ok(()),
        }
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

/// Shape check only; the provider is the final judge of a key.
pub fn is_valid_api_key(key: &str) -> bool {
    let key = key.trim();
    key.len() > 30 && key.starts_with("AIza")
}

// Default value functions
fn default_embedding_model() -> String { "text-embedding-004".to_string() }
fn default_embedding_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_embedding_dimension() -> usize { 768 }
fn default_embed_batch_size() -> usize { 1 }
fn default_rate_limit_delay_ms() -> u64 { 1000 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_base_delay_ms() -> u64 { 1000 }
fn default_retry_max_jitter_ms() -> u64 { 1000 }
fn default_max_title_chars() -> usize { 100 }
fn default_max_summary_chars() -> usize { 200 }
fn default_max_key_messages() -> usize { 4 }
fn default_max_message_chars() -> usize { 300 }
fn default_max_embedding_text_chars() -> usize { 8000 }
fn default_min_messages() -> usize { 2 }
fn default_min_word_count() -> usize { 20 }
fn default_summary_max_chars() -> usize { 150 }
fn default_topic_count() -> usize { 5 }
fn default_min_topic_word_len() -> usize { 4 }
