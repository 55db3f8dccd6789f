//! Error types for the Quarry engine and CLI.
//!
//! One unified enum covers every failure category: configuration,
//! I/O, index storage, embedding/LLM transport, and serialization.
//! States that are contained rather than propagated (a failed metadata
//! extraction, a failed sub-question, an unanswerable query) are NOT
//! errors; they are flags on the report and answer types in the engine.

use thiserror::Error;

/// Unified error type for Quarry.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic on recoverable conditions.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad parameters or malformed config, rejected before any I/O
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Embedding vector length does not match the index dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Query decomposition failed or returned unusable output
    #[error("Query planning failed: {0}")]
    PlanningFailure(String),

    /// Embedding capability failed after retries; callers may retry later
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding index storage errors
    #[error("Index error: {0}")]
    Index(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
