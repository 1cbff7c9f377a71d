//! Processing service: runs the pipeline stage by stage and keeps the last
//! successful result for cheap graph rebuilds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, instrument};

use crate::config::ChatGraphConfig;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::error::{ChatGraphError, Result};
use crate::graph::GraphBuilder;
use crate::normalizer::ConversationNormalizer;
use crate::parser::{parse_export, parse_export_file};
use crate::similarity::SimilarityMatrix;
use crate::types::{
    Conversation, ConversationEmbedding, ConversationGraph, ProcessingProgress, ProcessingStage,
    ProcessingStats, RawConversation, VisualizationControls,
};

// ============================================================================
// Progress sinks
// ============================================================================

pub trait ProgressSink: Send + Sync {
    fn send(&self, progress: ProcessingProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(ProcessingProgress) + Send + Sync,
{
    fn send(&self, progress: ProcessingProgress) {
        self(progress)
    }
}

/// Forwards progress into an unbounded channel. A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress(pub mpsc::UnboundedSender<ProcessingProgress>);

impl ChannelProgress {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProcessingProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn send(&self, progress: ProcessingProgress) {
        let _ = self.0.send(progress);
    }
}

// ============================================================================
// Results
// ============================================================================

/// Intermediate results a graph can be rebuilt from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedData {
    pub conversations: Vec<Conversation>,
    pub embeddings: Vec<ConversationEmbedding>,
    pub similarity_matrix: SimilarityMatrix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOutput {
    pub graph: ConversationGraph,
    pub raw_data: ProcessedData,
}

enum ExportSource<'a> {
    File(&'a Path),
    Bytes(&'a [u8]),
}

// ============================================================================
// Service
// ============================================================================

pub struct ProcessingService {
    config: ChatGraphConfig,
    normalizer: ConversationNormalizer,
    provider: Arc<dyn EmbeddingProvider>,
    reference_time: Option<DateTime<Utc>>,
    cache: RwLock<Option<ProcessedData>>,
}

impl ProcessingService {
    /// Validates credentials and builds the configured embedding provider.
    /// Fails before any stage runs when the configuration is unusable.
    pub fn new(config: ChatGraphConfig) -> Result<Self> {
        config.validate()?;
        let provider = create_provider(&config)?;
        Ok(Self::with_provider(config, provider))
    }

    pub fn with_provider(config: ChatGraphConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            normalizer: ConversationNormalizer::new(&config),
            config,
            provider,
            reference_time: None,
            cache: RwLock::new(None),
        }
    }

    /// Pins the time used for chronological colors.
    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    pub fn config(&self) -> &ChatGraphConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn graph_builder(&self) -> GraphBuilder {
        match self.reference_time {
            Some(t) => GraphBuilder::with_reference_time(t),
            None => GraphBuilder::new(),
        }
    }

    pub async fn process_file(
        &self,
        path: impl AsRef<Path>,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessingOutput> {
        self.process(ExportSource::File(path.as_ref()), sink).await
    }

    pub async fn process_bytes(
        &self,
        bytes: &[u8],
        sink: &dyn ProgressSink,
    ) -> Result<ProcessingOutput> {
        self.process(ExportSource::Bytes(bytes), sink).await
    }

    async fn process(
        &self,
        source: ExportSource<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessingOutput> {
        let mut stage = ProcessingStage::Parsing;
        match self.run(source, sink, &mut stage).await {
            Ok(output) => {
                *self.cache.write().await = Some(output.raw_data.clone());
                Ok(output)
            }
            Err(e) => {
                error!("Processing failed during {}: {}", stage, e);
                sink.send(ProcessingProgress::failed(stage, e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        source: ExportSource<'_>,
        sink: &dyn ProgressSink,
        stage: &mut ProcessingStage,
    ) -> Result<ProcessingOutput> {
        *stage = ProcessingStage::Parsing;
        sink.send(ProcessingProgress::new(
            ProcessingStage::Parsing,
            0.0,
            "Parsing chat export file...",
        ));
        let raw = self.parse_stage(source).await?;

        *stage = ProcessingStage::Cleaning;
        sink.send(ProcessingProgress::new(
            ProcessingStage::Cleaning,
            20.0,
            "Cleaning and filtering conversations...",
        ));
        let conversations = self.clean_stage(&raw)?;
        sink.send(ProcessingProgress::new(
            ProcessingStage::Cleaning,
            30.0,
            format!("Found {} valid conversations", conversations.len()),
        ));

        *stage = ProcessingStage::Embedding;
        sink.send(ProcessingProgress::new(
            ProcessingStage::Embedding,
            30.0,
            format!("Generating embeddings with {} provider...", self.provider.name()),
        ));
        let embeddings = self.embedding_stage(&conversations, sink).await?;

        *stage = ProcessingStage::Similarity;
        sink.send(ProcessingProgress::new(
            ProcessingStage::Similarity,
            70.0,
            "Calculating conversation similarities...",
        ));
        let similarity_matrix = self.similarity_stage(&embeddings)?;
        sink.send(ProcessingProgress::new(
            ProcessingStage::Similarity,
            85.0,
            "Similarity matrix complete",
        ));

        *stage = ProcessingStage::Graph;
        sink.send(ProcessingProgress::new(
            ProcessingStage::Graph,
            85.0,
            "Building conversation graph...",
        ));
        let graph = self.rebuild(
            &conversations,
            &embeddings,
            &similarity_matrix,
            &self.config.default_controls,
        );

        *stage = ProcessingStage::Complete;
        sink.send(ProcessingProgress::new(
            ProcessingStage::Complete,
            100.0,
            format!(
                "Successfully processed {} conversations with {} clusters",
                conversations.len(),
                graph.clusters.len()
            ),
        ));

        Ok(ProcessingOutput {
            graph,
            raw_data: ProcessedData {
                conversations,
                embeddings,
                similarity_matrix,
            },
        })
    }

    #[instrument(skip_all)]
    async fn parse_stage(&self, source: ExportSource<'_>) -> Result<Vec<RawConversation>> {
        match source {
            ExportSource::File(path) => parse_export_file(path).await,
            ExportSource::Bytes(bytes) => parse_export(bytes),
        }
    }

    #[instrument(skip_all, fields(records = raw.len()))]
    fn clean_stage(&self, raw: &[RawConversation]) -> Result<Vec<Conversation>> {
        let conversations = self.normalizer.normalize(raw);
        if conversations.is_empty() {
            return Err(ChatGraphError::NoValidData);
        }
        Ok(conversations)
    }

    #[instrument(skip_all, fields(provider = self.provider.name(), conversations = conversations.len()))]
    async fn embedding_stage(
        &self,
        conversations: &[Conversation],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<ConversationEmbedding>> {
        let on_progress = |progress: f32, message: &str| {
            sink.send(ProcessingProgress::new(
                ProcessingStage::Embedding,
                30.0 + progress * 0.4,
                message,
            ))
        };

        let embeddings = self.provider.generate(conversations, &on_progress).await;
        if embeddings.is_empty() {
            return Err(ChatGraphError::NoEmbeddings);
        }
        info!(
            "Embedded {} of {} conversations",
            embeddings.len(),
            conversations.len()
        );
        Ok(embeddings)
    }

    #[instrument(skip_all, fields(embeddings = embeddings.len()))]
    fn similarity_stage(&self, embeddings: &[ConversationEmbedding]) -> Result<SimilarityMatrix> {
        SimilarityMatrix::build(embeddings, self.provider.similarity_scale())
    }

    /// Re-runs only the graph builder, for visualization control changes.
    pub fn rebuild(
        &self,
        conversations: &[Conversation],
        embeddings: &[ConversationEmbedding],
        similarity_matrix: &SimilarityMatrix,
        controls: &VisualizationControls,
    ) -> ConversationGraph {
        self.graph_builder().build(
            conversations,
            embeddings,
            similarity_matrix,
            &controls.validated(),
        )
    }

    /// Rebuilds from the last successful run.
    pub async fn rebuild_cached(&self, controls: &VisualizationControls) -> Result<ConversationGraph> {
        let cache = self.cache.read().await;
        let data = cache.as_ref().ok_or(ChatGraphError::NoValidData)?;
        Ok(self.rebuild(
            &data.conversations,
            &data.embeddings,
            &data.similarity_matrix,
            controls,
        ))
    }

    pub async fn cached(&self) -> Option<ProcessedData> {
        self.cache.read().await.clone()
    }

    pub fn stats(&self, graph: &ConversationGraph) -> ProcessingStats {
        ProcessingStats::from_graph(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::demo_export;
    use std::sync::Mutex;

    fn offline_service() -> ProcessingService {
        ProcessingService::new(ChatGraphConfig::offline()).unwrap()
    }

    fn demo_bytes() -> Vec<u8> {
        serde_json::to_vec(&demo_export()).unwrap()
    }

    #[test]
    fn test_remote_without_key_fails_early() {
        let err = ProcessingService::new(ChatGraphConfig::default()).err().unwrap();
        assert!(matches!(err, ChatGraphError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_stage_order() {
        let service = offline_service();
        let reports = Mutex::new(Vec::new());
        let sink = |p: ProcessingProgress| reports.lock().unwrap().push(p);

        service.process_bytes(&demo_bytes(), &sink).await.unwrap();

        let reports = reports.into_inner().unwrap();
        let mut stages: Vec<ProcessingStage> = reports.iter().map(|p| p.stage).collect();
        stages.dedup();
        assert_eq!(
            stages,
            vec![
                ProcessingStage::Parsing,
                ProcessingStage::Cleaning,
                ProcessingStage::Embedding,
                ProcessingStage::Similarity,
                ProcessingStage::Graph,
                ProcessingStage::Complete,
            ]
        );
        assert!(reports.windows(2).all(|w| w[0].progress <= w[1].progress));
        assert!(reports.iter().all(|p| !p.is_error()));
        assert_eq!(reports.last().unwrap().progress, 100.0);
    }

    #[tokio::test]
    async fn test_failure_reports_stage() {
        let service = offline_service();
        let (sink, mut rx) = ChannelProgress::channel();

        let err = service.process_bytes(b"[]", &sink).await.unwrap_err();
        assert!(matches!(err, ChatGraphError::NoValidData));

        let mut last = None;
        while let Ok(p) = rx.try_recv() {
            last = Some(p);
        }
        let last = last.unwrap();
        assert_eq!(last.stage, ProcessingStage::Cleaning);
        assert_eq!(last.progress, 0.0);
        assert!(last.error.unwrap().contains("No valid conversations"));
    }

    #[tokio::test]
    async fn test_cache_only_written_on_success() {
        let service = offline_service();
        assert!(service.cached().await.is_none());
        assert!(service
            .rebuild_cached(&VisualizationControls::default())
            .await
            .is_err());

        let _ = service.process_bytes(b"not json", &|_: ProcessingProgress| {}).await;
        assert!(service.cached().await.is_none());

        service
            .process_bytes(&demo_bytes(), &|_: ProcessingProgress| {})
            .await
            .unwrap();
        let cached = service.cached().await.unwrap();
        assert_eq!(cached.conversations.len(), 5);
        assert_eq!(cached.similarity_matrix.len(), 5);
    }

    #[tokio::test]
    async fn test_rebuild_cached_uses_new_controls() {
        let service = offline_service();
        let output = service
            .process_bytes(&demo_bytes(), &|_: ProcessingProgress| {})
            .await
            .unwrap();

        let loose = service
            .rebuild_cached(&VisualizationControls {
                similarity_threshold: 0.1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(loose.edges.len() >= output.graph.edges.len());
        assert_eq!(loose.nodes.len(), output.graph.nodes.len());
    }

    #[tokio::test]
    async fn test_stats() {
        let service = offline_service();
        let output = service
            .process_bytes(&demo_bytes(), &|_: ProcessingProgress| {})
            .await
            .unwrap();

        let stats = service.stats(&output.graph);
        assert_eq!(stats.total_conversations, 5);
        assert_eq!(stats.total_clusters, output.graph.clusters.len());
        assert_eq!(stats.total_connections, output.graph.edges.len());
    }
}
