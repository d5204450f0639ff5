//! State errors.

use thiserror::Error;

/// State store error types.
#[derive(Debug, Error)]
pub enum StateError {
    /// No checkpoint recorded under this label.
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
