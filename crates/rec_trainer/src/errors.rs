use fairrec_core::RecCoreError;
use thiserror::Error;

/// Errors returned by the continual-training scheduler.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Divergence on the very first pre-training step is unrecoverable.
    #[error("non-finite prediction at the first pre-training step")]
    DivergedAtStart,

    #[error(transparent)]
    Core(#[from] RecCoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for trainer operations
pub type Result<T> = std::result::Result<T, TrainerError>;
