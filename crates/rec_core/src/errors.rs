//! Error types for the FairRec core

use thiserror::Error;

/// Errors that can occur in the FairRec core.
#[derive(Error, Debug)]
pub enum RecCoreError {
    /// Invalid configuration detected before any training or evaluation
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or inconsistent input data
    #[error("data error: {0}")]
    Data(String),

    /// Model collaborator failure
    #[error("model error: {0}")]
    Model(String),

    /// Checkpoint payload failed integrity verification
    #[error("checkpoint integrity error: {0}")]
    Integrity(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for FairRec core operations
pub type Result<T> = std::result::Result<T, RecCoreError>;
