//! FairRec Trainer - continual training over interaction snapshots
//!
//! Drives pre-training over the first snapshot and incremental
//! fine-tuning over later ones, with checkpoint persistence, divergence
//! detection, and cooperative cancellation.

pub mod config;
pub mod errors;
pub mod mf;
pub mod online;
pub mod scheduler;

pub use config::{RunConfig, TrainingMode};
pub use errors::TrainerError;
pub use mf::{MatrixFactorization, MfConfig};
pub use online::{OnlineTrainer, StepOutcome};
pub use scheduler::{
    eval_termination, CancelToken, RunOutcome, SnapshotScheduler, StopDecider, StopDecision,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
