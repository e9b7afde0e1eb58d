//! Run configuration
//!
//! All list-valued and enumerated options are parsed into typed values
//! up front; an unrecognized optimizer, metric, or mode name is fatal
//! before any training or evaluation begins.

use crate::errors::{Result, TrainerError};
use fairrec_core::{Metric, OptimizerConfig, OptimizerKind, ParamSelection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Training strategy, decided once at configuration load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingMode {
    /// Train on snapshot 0 and persist a single checkpoint.
    FullTrain,
    /// Train on snapshot 0 and persist one checkpoint per boundary,
    /// seeding later independent runs.
    PreTrain,
    /// Pre-train then fine-tune each later snapshot. Snapshots at or
    /// below `threshold` are assumed handled by an external re-run:
    /// they get no fine-tuning passes and their checkpoints are not
    /// overwritten. Plain fine-tuning uses threshold -1.
    FineTune { threshold: i64 },
}

impl TrainingMode {
    pub fn name(&self) -> &'static str {
        match self {
            TrainingMode::FullTrain => "fulltrain",
            TrainingMode::PreTrain => "pretrain",
            TrainingMode::FineTune { .. } => "finetune",
        }
    }
}

impl FromStr for TrainingMode {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self> {
        let mode = s.trim().to_ascii_lowercase();
        match mode.as_str() {
            "fulltrain" => Ok(TrainingMode::FullTrain),
            "pretrain" => Ok(TrainingMode::PreTrain),
            "finetune" => Ok(TrainingMode::FineTune { threshold: -1 }),
            _ if mode.starts_with("modi-fine") => {
                let digits: String = mode.chars().filter(|c| c.is_ascii_digit()).collect();
                let threshold = if digits.is_empty() {
                    -1
                } else {
                    digits.parse::<i64>().map_err(|_| {
                        TrainerError::Config(format!("invalid fine-tune threshold in mode: {s}"))
                    })?
                };
                Ok(TrainingMode::FineTune { threshold })
            }
            other => Err(TrainerError::Config(format!("unknown training mode: {other}"))),
        }
    }
}

/// Parse a comma-separated list of positive integers (top-K values).
pub fn parse_usize_list(list: &str) -> Result<Vec<usize>> {
    let mut values = Vec::new();
    for entry in list.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let value = entry
            .parse::<usize>()
            .map_err(|_| TrainerError::Config(format!("invalid list entry: {entry}")))?;
        values.push(value);
    }
    if values.is_empty() {
        return Err(TrainerError::Config("empty list option".to_string()));
    }
    Ok(values)
}

/// Fully validated run configuration.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Pre-training passes over snapshot 0.
    pub epochs: usize,
    /// Fine-tuning passes per later snapshot.
    pub tune_epochs: usize,
    /// Early-stop patience over validation scores.
    pub early_stop: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    pub optimizer: OptimizerKind,
    pub param_selection: ParamSelection,
    /// Negative sample size per user; `None` ranks every negative.
    pub num_neg_samples: Option<usize>,
    pub top_k: Vec<usize>,
    pub metrics: Vec<Metric>,
    pub mode: TrainingMode,
    pub snapshots_dir: PathBuf,
    pub result_dir: PathBuf,
    /// Seed for deterministic pre-training shuffles.
    pub seed: i64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            tune_epochs: 10,
            early_stop: 5,
            learning_rate: 0.001,
            weight_decay: 1e-4,
            batch_size: 256,
            eval_batch_size: 256,
            optimizer: OptimizerKind::Adam,
            param_selection: ParamSelection::Customized,
            num_neg_samples: Some(100),
            top_k: vec![20],
            metrics: vec![
                Metric::Recall,
                Metric::Ndcg1,
                Metric::Ap0,
                Metric::Mrr1,
                Metric::F1,
                Metric::HitRatio,
                Metric::Hit,
                Metric::Mrr0,
                Metric::Precision,
            ],
            mode: TrainingMode::FineTune { threshold: -1 },
            snapshots_dir: PathBuf::from("snapshots"),
            result_dir: PathBuf::from("results"),
            seed: 42,
        }
    }
}

impl RunConfig {
    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            kind: self.optimizer,
            learning_rate: self.learning_rate,
            weight_decay: self.weight_decay,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TrainerError::Config("epoch count must be positive".to_string()));
        }
        if self.batch_size == 0 || self.eval_batch_size == 0 {
            return Err(TrainerError::Config("batch sizes must be positive".to_string()));
        }
        if self.top_k.is_empty() {
            return Err(TrainerError::Config("top-K list must not be empty".to_string()));
        }
        if self.metrics.is_empty() {
            return Err(TrainerError::Config("metric list must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() -> Result<()> {
        assert_eq!("fulltrain".parse::<TrainingMode>()?, TrainingMode::FullTrain);
        assert_eq!("pretrain".parse::<TrainingMode>()?, TrainingMode::PreTrain);
        assert_eq!(
            "finetune".parse::<TrainingMode>()?,
            TrainingMode::FineTune { threshold: -1 }
        );
        assert_eq!(
            "modi-fine3".parse::<TrainingMode>()?,
            TrainingMode::FineTune { threshold: 3 }
        );
        Ok(())
    }

    #[test]
    fn test_unknown_mode_is_fatal() {
        assert!(matches!(
            "warmstart".parse::<TrainingMode>(),
            Err(TrainerError::Config(_))
        ));
    }

    #[test]
    fn test_usize_list_parsing() -> Result<()> {
        assert_eq!(parse_usize_list("20")?, vec![20]);
        assert_eq!(parse_usize_list("5, 10,20")?, vec![5, 10, 20]);
        assert!(parse_usize_list("5,x").is_err());
        assert!(parse_usize_list("").is_err());
        Ok(())
    }

    #[test]
    fn test_validation_rejects_empty_lists() {
        let config = RunConfig {
            top_k: vec![],
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfig {
            metrics: vec![],
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(RunConfig::default().validate().is_ok());
    }
}
