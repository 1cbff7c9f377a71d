//! Error types for chatgraph
//!
//! File-level and configuration-level errors abort the pipeline. Item-level
//! errors (`EmbeddingItem`, `EmbeddingBatch`) are built so they can be logged
//! with full context, then swallowed by the stage that produced them.

use thiserror::Error;

/// Main error type for chatgraph operations
#[derive(Error, Debug)]
pub enum ChatGraphError {
    /// Malformed JSON or an unrecognized export container
    #[error("{0}")]
    Format(String),

    /// Every conversation was filtered out during normalization
    #[error("No valid conversations found in the export file.")]
    NoValidData,

    /// A single conversation exhausted its embedding retries
    #[error("Embedding failed for conversation {conversation_id}: {reason}")]
    EmbeddingItem {
        conversation_id: String,
        reason: String,
    },

    /// A whole embedding batch failed
    #[error("Embedding batch {batch} failed: {reason}")]
    EmbeddingBatch { batch: usize, reason: String },

    /// No conversation received an embedding
    #[error("Failed to generate embeddings for conversations.")]
    NoEmbeddings,

    /// Vectors of unequal length were compared
    #[error("Embedding dimension mismatch: {left} != {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// Missing or malformed provider credentials
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network errors
    #[error("Network error: {0}")]
    Network(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl ChatGraphError {
    /// Errors the pipeline recovers from locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChatGraphError::EmbeddingItem { .. } | ChatGraphError::EmbeddingBatch { .. }
        )
    }
}

impl From<anyhow::Error> for ChatGraphError {
    fn from(err: anyhow::Error) -> Self {
        ChatGraphError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for ChatGraphError {
    fn from(err: reqwest::Error) -> Self {
        ChatGraphError::Network(err.to_string())
    }
}

/// Result type alias for chatgraph operations
pub type Result<T> = std::result::Result<T, ChatGraphError>;
