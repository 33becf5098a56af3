//! Shared error taxonomy for the feed subsystem.

use thiserror::Error;

/// Errors surfaced by feed operations.
///
/// Validation problems are caught at the orchestrator boundary and never
/// reach the store; `NotFound` propagates unchanged from the store to the
/// caller. Every failure path leaves the store either fully-before or
/// fully-after the attempted operation.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Chunking or index parameters are out of bounds.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A draft, update, or request failed boundary validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No entry exists with the given id.
    #[error("feed entry '{id}' not found")]
    NotFound { id: String },

    /// The embedding provider failed or is unreachable.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The persistence layer failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl FeedError {
    /// Shorthand for a [`FeedError::NotFound`] with an owned id.
    pub fn not_found(id: impl Into<String>) -> Self {
        FeedError::NotFound { id: id.into() }
    }

    /// Shorthand for a [`FeedError::Validation`] message.
    pub fn validation(msg: impl Into<String>) -> Self {
        FeedError::Validation(msg.into())
    }
}

impl From<tokio_rusqlite::Error> for FeedError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        FeedError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Storage(err.to_string())
    }
}
