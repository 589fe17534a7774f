//! Error taxonomy for the retrieval and generation pipeline

use thiserror::Error;

/// Result type alias using [`QaError`]
pub type Result<T> = std::result::Result<T, QaError>;

/// Errors surfaced by the core pipeline.
///
/// Collaborator failures carry a caller-facing message only; the underlying
/// transport error is logged, not propagated.
#[derive(Error, Debug)]
pub enum QaError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Embedding dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Generation failed for query '{query}': {message}")]
    GenerationFailure { query: String, message: String },

    #[error("Generation output for query '{query}' was invalid after a corrective retry: {reason}")]
    GenerationParseError { query: String, reason: String },

    #[error("Extraction failed for {source_name}: {message}")]
    Extraction { source_name: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QaError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        QaError::InvalidArgument(message.into())
    }
}
