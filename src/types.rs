use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Raw export records
// ============================================================================

/// One conversation as it appears in a chat export file.
///
/// `mapping` is a tree addressed by node id: every node points back at its
/// parent and forward at its children. Only the fields the pipeline reads are
/// modelled; anything else in the export is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConversation {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub create_time: Option<f64>,
    #[serde(default)]
    pub update_time: Option<f64>,
    #[serde(default)]
    pub mapping: HashMap<String, RawNode>,
    #[serde(default)]
    pub current_node: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<RawMessage>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub author: RawAuthor,
    #[serde(default)]
    pub content: Option<RawContent>,
    #[serde(default)]
    pub create_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAuthor {
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContent {
    #[serde(default)]
    pub content_type: Option<String>,
    /// Exports mix plain strings with structured parts (images, files).
    #[serde(default)]
    pub parts: Vec<serde_json::Value>,
}

impl RawMessage {
    /// Text parts joined with single spaces and trimmed.
    pub fn joined_text(&self) -> String {
        let Some(content) = &self.content else {
            return String::new();
        };

        content
            .parts
            .iter()
            .filter_map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

// ============================================================================
// Normalized conversations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub word_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub word_count: usize,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub messages: Vec<ProcessedMessage>,
    pub metadata: ConversationMetadata,
}

// ============================================================================
// Embeddings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingMetadata {
    pub word_count: usize,
    pub topic_keywords: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEmbedding {
    pub conversation_id: String,
    pub embedding: Vec<f32>,
    pub metadata: EmbeddingMetadata,
}

impl ConversationEmbedding {
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub conversation: Conversation,
    /// Layout seed only; the renderer owns the final positions.
    pub position: Position,
    pub size: f64,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f32,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationCluster {
    pub id: String,
    pub name: String,
    pub description: String,
    pub conversations: Vec<String>,
    pub centroid: Vec<f32>,
    pub color: String,
    pub size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub clusters: Vec<ConversationCluster>,
}

impl ConversationGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn cluster(&self, id: &str) -> Option<&ConversationCluster> {
        self.clusters.iter().find(|cluster| cluster.id == id)
    }
}

// ============================================================================
// Visualization controls
// ============================================================================

/// Accepted by the graph builder; only `Similarity` changes behaviour today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClusteringAlgorithm {
    Similarity,
    Topic,
    Chronological,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeSizeMode {
    MessageCount,
    WordCount,
    Uniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColorScheme {
    Cluster,
    Chronological,
    Topic,
}

impl FromStr for NodeSizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "messageCount" | "message-count" => Ok(NodeSizeMode::MessageCount),
            "wordCount" | "word-count" => Ok(NodeSizeMode::WordCount),
            "uniform" => Ok(NodeSizeMode::Uniform),
            other => Err(format!("unknown node size mode: {}", other)),
        }
    }
}

impl FromStr for ColorScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cluster" => Ok(ColorScheme::Cluster),
            "chronological" => Ok(ColorScheme::Chronological),
            "topic" => Ok(ColorScheme::Topic),
            other => Err(format!("unknown color scheme: {}", other)),
        }
    }
}

impl FromStr for ClusteringAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "similarity" => Ok(ClusteringAlgorithm::Similarity),
            "topic" => Ok(ClusteringAlgorithm::Topic),
            "chronological" => Ok(ClusteringAlgorithm::Chronological),
            other => Err(format!("unknown clustering algorithm: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisualizationControls {
    pub similarity_threshold: f32,
    pub clustering_algorithm: ClusteringAlgorithm,
    pub node_size: NodeSizeMode,
    pub color_scheme: ColorScheme,
    pub show_edges: bool,
    pub edge_thickness: f32,
}

pub const MIN_SIMILARITY_THRESHOLD: f32 = 0.1;
pub const MAX_SIMILARITY_THRESHOLD: f32 = 1.0;
pub const MIN_EDGE_THICKNESS: f32 = 0.5;
pub const MAX_EDGE_THICKNESS: f32 = 5.0;

impl Default for VisualizationControls {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            clustering_algorithm: ClusteringAlgorithm::Similarity,
            node_size: NodeSizeMode::MessageCount,
            color_scheme: ColorScheme::Cluster,
            show_edges: true,
            edge_thickness: 1.0,
        }
    }
}

impl VisualizationControls {
    /// Clamps the numeric controls into the ranges the UI exposes.
    pub fn validated(mut self) -> Self {
        self.similarity_threshold = self
            .similarity_threshold
            .clamp(MIN_SIMILARITY_THRESHOLD, MAX_SIMILARITY_THRESHOLD);
        self.edge_thickness = self
            .edge_thickness
            .clamp(MIN_EDGE_THICKNESS, MAX_EDGE_THICKNESS);
        self
    }
}

// ============================================================================
// Progress reporting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Parsing,
    Cleaning,
    Embedding,
    Similarity,
    Graph,
    Complete,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Parsing => "parsing",
            ProcessingStage::Cleaning => "cleaning",
            ProcessingStage::Embedding => "embedding",
            ProcessingStage::Similarity => "similarity",
            ProcessingStage::Graph => "graph",
            ProcessingStage::Complete => "complete",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub stage: ProcessingStage,
    /// 0 to 100.
    pub progress: f32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingProgress {
    pub fn new(stage: ProcessingStage, progress: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(stage: ProcessingStage, error: impl Into<String>) -> Self {
        Self {
            stage,
            progress: 0.0,
            message: "Processing failed".to_string(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub total_conversations: usize,
    pub total_clusters: usize,
    pub total_connections: usize,
    pub average_cluster_size: usize,
    pub largest_cluster: usize,
}
