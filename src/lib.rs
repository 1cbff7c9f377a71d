//! # ChatGraph
//!
//! Turns a chat-history export into a graph of related conversations.
//!
//! ## Pipeline
//!
//! - **Parser**: reads the export JSON into raw conversation trees
//! - **Normalizer**: flattens each tree into an ordered message list and
//!   derives summary, topics and sentiment
//! - **Embeddings**: one vector per conversation, from a remote model or the
//!   deterministic offline generator
//! - **Similarity**: pairwise cosine similarity matrix
//! - **Graph**: nodes, thresholded edges and connected-component clusters
//! - **Processing**: runs the stages in order with progress reporting
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use chatgraph::{ChatGraphConfig, ProcessingService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = ProcessingService::new(ChatGraphConfig::offline())?;
//!     let output = service
//!         .process_file("conversations.json", &|p: chatgraph::types::ProcessingProgress| {
//!             println!("[{}] {:.0}% {}", p.stage, p.progress, p.message);
//!         })
//!         .await?;
//!     println!("{} clusters", output.graph.clusters.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod demo;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod insights;
pub mod logging;
pub mod normalizer;
pub mod parser;
pub mod processing;
pub mod similarity;
pub mod text_analysis;
pub mod types;
pub mod utils;

/// Visual encodings for graph nodes: sizes, colors, initial layout
pub mod visualization {
    pub mod encoding;
}

pub use config::{ChatGraphConfig, EmbeddingMode};
pub use embeddings::{
    create_provider, generate_mock_embeddings, EmbeddingProvider, OfflineEmbeddings,
    RemoteEmbeddings,
};
pub use error::{ChatGraphError, Result};
pub use graph::GraphBuilder;
pub use insights::GraphInsights;
pub use normalizer::ConversationNormalizer;
pub use parser::{parse_export, parse_export_file};
pub use processing::{ChannelProgress, ProcessingOutput, ProcessingService, ProgressSink};
pub use similarity::{cosine_similarity, SimilarityMatrix, SimilarityScale};
pub use types::{ConversationGraph, VisualizationControls};
