use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{ChatGraphConfig, EmbeddingMode};
use crate::error::{ChatGraphError, Result};
use crate::similarity::SimilarityScale;
use crate::types::{Conversation, ConversationEmbedding, EmbeddingMetadata};
use crate::utils::{retry_with_backoff, truncate_chars, RetryConfig};

/// Cache for embeddings to avoid re-requesting identical text
type EmbeddingCache = Arc<DashMap<String, Vec<f32>>>;

pub const GENERATION_COMPLETE: &str = "Embedding generation complete";

/// Receives `(percent, message)` updates while embeddings are generated.
pub trait ProgressCallback: Send + Sync {
    fn report(&self, progress: f32, message: &str);
}

impl<F> ProgressCallback for F
where
    F: Fn(f32, &str) + Send + Sync,
{
    fn report(&self, progress: f32, message: &str) {
        self(progress, message)
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One embedding per conversation that succeeded, in input order.
    /// Per-item failures are logged and skipped, never returned.
    async fn generate(
        &self,
        conversations: &[Conversation],
        progress: &dyn ProgressCallback,
    ) -> Vec<ConversationEmbedding>;

    fn name(&self) -> &str;

    /// How scores between this provider's vectors should be stored.
    fn similarity_scale(&self) -> SimilarityScale;
}

/// Text in, vector out. The remote provider's only view of the network.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Builds the provider selected by `config.embedding_mode`.
pub fn create_provider(config: &ChatGraphConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.embedding_mode {
        EmbeddingMode::Remote => Arc::new(RemoteEmbeddings::from_config(config)?),
        EmbeddingMode::Offline => Arc::new(OfflineEmbeddings::new(config.embedding_dimension)),
    };

    info!(
        "Initialized {} embedding provider with model {}",
        provider.name(),
        config.embedding_model
    );
    Ok(provider)
}

fn embedding_for(conversation: &Conversation, values: Vec<f32>) -> ConversationEmbedding {
    ConversationEmbedding {
        conversation_id: conversation.id.clone(),
        embedding: values,
        metadata: EmbeddingMetadata {
            word_count: conversation.metadata.word_count,
            topic_keywords: conversation.metadata.topics.clone(),
            generated_at: Utc::now(),
        },
    }
}

// ============================================================================
// Text preparation
// ============================================================================

/// Character budgets for the text sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLimits {
    pub title: usize,
    pub summary: usize,
    pub key_messages: usize,
    pub message: usize,
    pub total: usize,
}

impl TextLimits {
    pub fn from_config(config: &ChatGraphConfig) -> Self {
        Self {
            title: config.max_title_chars,
            summary: config.max_summary_chars,
            key_messages: config.max_key_messages,
            message: config.max_message_chars,
            total: config.max_embedding_text_chars,
        }
    }
}

impl Default for TextLimits {
    fn default() -> Self {
        Self::from_config(&ChatGraphConfig::default())
    }
}

/// Title, summary and the opening messages, each truncated, then capped overall.
pub fn prepare_text_for_embedding(conversation: &Conversation, limits: &TextLimits) -> String {
    let key_messages = conversation
        .messages
        .iter()
        .take(limits.key_messages)
        .map(|m| format!("{}: {}", m.role, truncate_chars(&m.content, limits.message)))
        .collect::<Vec<_>>()
        .join("\n");

    let full_text = format!(
        "Title: {}\nSummary: {}\nKey Messages:\n{}",
        truncate_chars(&conversation.title, limits.title),
        truncate_chars(&conversation.summary, limits.summary),
        key_messages
    );

    truncate_chars(&full_text, limits.total).to_string()
}

// ============================================================================
// Remote provider
// ============================================================================

#[derive(Clone)]
pub struct RemoteEmbeddings {
    client: Arc<dyn EmbeddingClient>,
    model: String,
    batch_size: usize,
    rate_limit_delay: Duration,
    retry: RetryConfig,
    limits: TextLimits,
    cache: EmbeddingCache,
    semaphore: Arc<Semaphore>,
}

impl RemoteEmbeddings {
    /// Validates the credential, then talks to the Gemini embedding API.
    pub fn from_config(config: &ChatGraphConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config.embedding_api_key.clone().ok_or_else(|| {
            ChatGraphError::Configuration("embedding API key is not configured".to_string())
        })?;

        let client = GeminiClient::new(
            config.embedding_base_url.clone(),
            config.embedding_model.clone(),
            api_key,
        );
        Ok(Self::with_client(Arc::new(client), config))
    }

    /// Uses an arbitrary client; pacing and budgets still come from `config`.
    pub fn with_client(client: Arc<dyn EmbeddingClient>, config: &ChatGraphConfig) -> Self {
        Self {
            client,
            model: config.embedding_model.clone(),
            batch_size: config.embed_batch_size.max(1),
            rate_limit_delay: config.rate_limit_delay(),
            retry: RetryConfig {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
                max_jitter: Duration::from_millis(config.retry_max_jitter_ms),
            },
            limits: TextLimits::from_config(config),
            cache: Arc::new(DashMap::new()),
            // One request in flight at a time
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    fn compute_cache_key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(self.model.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn embed_conversation(&self, conversation: &Conversation) -> Result<Vec<f32>> {
        let text = prepare_text_for_embedding(conversation, &self.limits);
        let cache_key = self.compute_cache_key(&text);
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!("Embedding cache hit for conversation {}", conversation.id);
            return Ok(cached.clone());
        }

        let operation = format!("embedding conversation {}", conversation.id);
        let values = retry_with_backoff(|| self.client.embed(&text), &self.retry, &operation)
            .await
            .map_err(|e| ChatGraphError::EmbeddingItem {
                conversation_id: conversation.id.clone(),
                reason: e.to_string(),
            })?;

        if !values.is_empty() {
            self.cache.insert(cache_key, values.clone());
        }
        Ok(values)
    }

    async fn process_batch(
        &self,
        batch_index: usize,
        batch: &[Conversation],
        state: &mut BatchState<'_>,
    ) -> Result<Vec<ConversationEmbedding>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ChatGraphError::EmbeddingBatch {
                batch: batch_index + 1,
                reason: e.to_string(),
            })?;

        let mut embeddings = Vec::with_capacity(batch.len());
        for conversation in batch {
            match self.embed_conversation(conversation).await {
                Ok(values) => match state.accept(conversation, &values) {
                    Ok(()) => embeddings.push(embedding_for(conversation, values)),
                    Err(e) => warn!("{}", e),
                },
                Err(e) => warn!("{}", e),
            }
            state.advance();
        }

        Ok(embeddings)
    }
}

/// Progress and dimension bookkeeping shared across batches.
struct BatchState<'a> {
    processed: usize,
    total: usize,
    dimension: Option<usize>,
    progress: &'a dyn ProgressCallback,
}

impl<'a> BatchState<'a> {
    fn accept(&mut self, conversation: &Conversation, values: &[f32]) -> Result<()> {
        let reject = |reason: String| ChatGraphError::EmbeddingItem {
            conversation_id: conversation.id.clone(),
            reason,
        };

        if values.is_empty() {
            return Err(reject("provider returned an empty vector".to_string()));
        }

        match self.dimension {
            None => {
                self.dimension = Some(values.len());
                Ok(())
            }
            Some(expected) if expected != values.len() => Err(reject(format!(
                "dimension {} does not match earlier vectors ({})",
                values.len(),
                expected
            ))),
            Some(_) => Ok(()),
        }
    }

    fn advance(&mut self) {
        self.processed += 1;
        let percent = (self.processed as f32 / self.total as f32) * 100.0;
        self.progress.report(
            percent,
            &format!("Embedded {} of {} conversations", self.processed, self.total),
        );
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddings {
    async fn generate(
        &self,
        conversations: &[Conversation],
        progress: &dyn ProgressCallback,
    ) -> Vec<ConversationEmbedding> {
        info!("Generating embeddings for {} conversations", conversations.len());

        let batches: Vec<&[Conversation]> = conversations.chunks(self.batch_size).collect();
        let mut state = BatchState {
            processed: 0,
            total: conversations.len(),
            dimension: None,
            progress,
        };
        let mut embeddings = Vec::with_capacity(conversations.len());

        for (i, batch) in batches.iter().enumerate() {
            match self.process_batch(i, batch, &mut state).await {
                Ok(batch_embeddings) => embeddings.extend(batch_embeddings),
                Err(e) => {
                    // Keep percentages moving even when a batch is lost
                    warn!("{}", e);
                    for _ in 0..batch.len() {
                        state.advance();
                    }
                }
            }

            if i + 1 < batches.len() && !self.rate_limit_delay.is_zero() {
                tokio::time::sleep(self.rate_limit_delay).await;
            }
        }

        info!(
            "Generated {} of {} embeddings",
            embeddings.len(),
            conversations.len()
        );
        progress.report(100.0, GENERATION_COMPLETE);
        embeddings
    }

    fn name(&self) -> &str {
        "Gemini"
    }

    fn similarity_scale(&self) -> SimilarityScale {
        SimilarityScale::Raw
    }
}

// Gemini API client
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: RequestContent<'a>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ResponseEmbedding,
}

#[derive(Deserialize)]
struct ResponseEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: RequestContent {
                parts: vec![RequestPart { text }],
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<EmbedContentResponse>()
            .await?;

        Ok(response.embedding.values)
    }
}

// ============================================================================
// Offline provider
// ============================================================================

const CODE_TOPICS: &[&str] = &["javascript", "react", "code"];
const DATA_TOPICS: &[&str] = &["python", "data"];
const TOPIC_BAND_WIDTH: usize = 256;
const TOPIC_OFFSET: f64 = 0.5;

/// Deterministic, network-free embeddings for demos and tests.
#[derive(Debug, Clone)]
pub struct OfflineEmbeddings {
    dimension: usize,
}

impl OfflineEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Default for OfflineEmbeddings {
    fn default() -> Self {
        Self::new(768)
    }
}

#[async_trait]
impl EmbeddingProvider for OfflineEmbeddings {
    async fn generate(
        &self,
        conversations: &[Conversation],
        progress: &dyn ProgressCallback,
    ) -> Vec<ConversationEmbedding> {
        let embeddings = generate_mock_embeddings(conversations, self.dimension);
        debug!("Generated {} offline embeddings", embeddings.len());
        progress.report(100.0, GENERATION_COMPLETE);
        embeddings
    }

    fn name(&self) -> &str {
        "Offline"
    }

    fn similarity_scale(&self) -> SimilarityScale {
        SimilarityScale::Rescaled
    }
}

pub fn generate_mock_embeddings(
    conversations: &[Conversation],
    dimension: usize,
) -> Vec<ConversationEmbedding> {
    conversations
        .iter()
        .map(|conversation| {
            let values = mock_vector(&conversation.id, &conversation.metadata.topics, dimension);
            embedding_for(conversation, values)
        })
        .collect()
}

/// Pseudo-random vector seeded by `id`, nudged toward a shared region when
/// the topics name a known subject.
pub fn mock_vector(id: &str, topics: &[String], dimension: usize) -> Vec<f32> {
    let seed = seed_for(id);
    let has_any = |wanted: &[&str]| topics.iter().any(|t| wanted.contains(&t.as_str()));
    let code_band = if has_any(CODE_TOPICS) { 0..TOPIC_BAND_WIDTH } else { 0..0 };
    let data_band = if has_any(DATA_TOPICS) {
        TOPIC_BAND_WIDTH..2 * TOPIC_BAND_WIDTH
    } else {
        0..0
    };

    (0..dimension)
        .map(|i| {
            let x = (seed * 12.9898 + i as f64 * 78.233).sin() * 43758.5453;
            let mut value = x - x.floor() - 0.5;
            if code_band.contains(&i) {
                value += TOPIC_OFFSET;
            }
            if data_band.contains(&i) {
                value += TOPIC_OFFSET;
            }
            value as f32
        })
        .collect()
}

fn seed_for(id: &str) -> f64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100_000) as f64
}
