//! Snapshot training scheduler
//!
//! The top-level controller: pre-trains over snapshot 0, then either
//! persists checkpoints and stops (full/pre-training strategies) or
//! fine-tunes each later snapshot in order. Checkpoint writes are
//! synchronous; cancellation is observed between pre-training epochs.

use crate::config::{RunConfig, TrainingMode};
use crate::errors::{Result, TrainerError};
use crate::online::OnlineTrainer;
use fairrec_core::model::{LossContext, MicroBatch, RecommenderModel};
use fairrec_core::types::{Interaction, SnapshotBoundaries};
use fairrec_core::{EdgeListStore, LcgRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared with a signal handler.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Operator decision after an interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopDecision {
    /// Stop immediately, skipping all further evaluation.
    SkipEvaluation,
    /// Stop training but still evaluate the last good checkpoints.
    EvaluateCheckpoints,
}

/// Asked once when an interrupt is observed.
pub trait StopDecider {
    fn on_interrupt(&mut self) -> StopDecision;
}

/// Interactive decider: reads a confirmation from stdin.
pub struct PromptDecider;

impl StopDecider for PromptDecider {
    fn on_interrupt(&mut self) -> StopDecision {
        eprint!("Exit completely without evaluation? (y/n) (default n): ");
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_ok()
            && line.trim().to_ascii_lowercase().starts_with('y')
        {
            StopDecision::SkipEvaluation
        } else {
            StopDecision::EvaluateCheckpoints
        }
    }
}

/// Terminal state of one scheduler run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// All snapshots processed; checkpoints written in order.
    Completed { checkpoints: Vec<usize> },
    /// Cancelled during pre-training.
    Stopped { skip_evaluation: bool },
    /// Pre-training diverged past the first step; nothing persisted.
    Diverged { epoch: usize },
}

/// Mean statistics of one training pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassStats {
    pub loss: f64,
    pub base_loss: f64,
    pub fairness_loss: f64,
    pub parity: f64,
    pub fairness_weight: f64,
    pub steps: usize,
    /// Step index of the first non-finite prediction, if any.
    pub diverged_at: Option<usize>,
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Early-stop heuristic over per-epoch validation scores: terminate when
/// at least 20 epochs elapsed and the last `patience` scores are
/// non-increasing, or when the best score is more than 20 epochs old.
pub fn eval_termination(history: &[f64], patience: usize) -> bool {
    if history.len() > 20 && patience > 0 && patience <= history.len() {
        let tail = &history[history.len() - patience..];
        if tail.windows(2).all(|pair| pair[1] <= pair[0]) {
            return true;
        }
    }

    let best_idx = history
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx);
    if let Some(best_idx) = best_idx {
        if history.len() - best_idx > 20 {
            return true;
        }
    }

    false
}

/// Drives the full training lifecycle for one configured strategy.
pub struct SnapshotScheduler {
    config: RunConfig,
    boundaries: SnapshotBoundaries,
    trainer: OnlineTrainer,
    cancel: CancelToken,
    time_log: Vec<(String, f64)>,
}

impl SnapshotScheduler {
    pub fn new(config: RunConfig, boundaries: SnapshotBoundaries, cancel: CancelToken) -> Self {
        let trainer = OnlineTrainer::new(&config);
        Self {
            config,
            boundaries,
            trainer,
            cancel,
            time_log: Vec::new(),
        }
    }

    /// Wall time spent per phase, in scheduling order.
    pub fn time_log(&self) -> &[(String, f64)] {
        &self.time_log
    }

    /// Run the configured strategy to a terminal state.
    ///
    /// `start_snapshot` tags the single checkpoint written by the
    /// full-training strategy.
    pub fn run(
        &mut self,
        model: &mut dyn RecommenderModel,
        stream: &EdgeListStore,
        ctx: &LossContext<'_>,
        decider: &mut dyn StopDecider,
        start_snapshot: usize,
    ) -> Result<RunOutcome> {
        match self.pretrain(model, stream, ctx, decider)? {
            PretrainOutcome::Finished => {}
            PretrainOutcome::Stopped { skip_evaluation } => {
                return Ok(RunOutcome::Stopped { skip_evaluation });
            }
            PretrainOutcome::Diverged { epoch } => {
                return Ok(RunOutcome::Diverged { epoch });
            }
        }

        info!("training mode: {}", self.config.mode.name());
        match self.config.mode {
            TrainingMode::FullTrain => {
                model.save(&format!("_snap{start_snapshot}"))?;
                Ok(RunOutcome::Completed {
                    checkpoints: vec![start_snapshot],
                })
            }
            TrainingMode::PreTrain => {
                let mut checkpoints = Vec::with_capacity(self.boundaries.len());
                for idx in 0..self.boundaries.len() {
                    model.save(&format!("_snap{idx}"))?;
                    checkpoints.push(idx);
                }
                Ok(RunOutcome::Completed { checkpoints })
            }
            TrainingMode::FineTune { threshold } => {
                model.save("_snap0")?;
                let mut checkpoints = vec![0];
                checkpoints.extend(self.fine_tune(model, stream, ctx, threshold)?);
                Ok(RunOutcome::Completed { checkpoints })
            }
        }
    }

    fn pretrain(
        &mut self,
        model: &mut dyn RecommenderModel,
        stream: &EdgeListStore,
        ctx: &LossContext<'_>,
        decider: &mut dyn StopDecider,
    ) -> Result<PretrainOutcome> {
        let range = self
            .boundaries
            .range(0)
            .ok_or_else(|| TrainerError::Config("no snapshot boundaries".to_string()))?;
        let examples = stream.slice(range);
        let phase_start = Instant::now();

        for epoch in 0..self.config.epochs {
            if self.cancel.is_cancelled() {
                info!("interrupt observed before epoch {}, stopping", epoch + 1);
                self.time_log
                    .push(("pre-train".to_string(), phase_start.elapsed().as_secs_f64()));
                let decision = decider.on_interrupt();
                return Ok(PretrainOutcome::Stopped {
                    skip_evaluation: decision == StopDecision::SkipEvaluation,
                });
            }

            let epoch_start = Instant::now();
            let stats = self.run_pass(model, examples, ctx, true, epoch)?;
            info!(
                "Epoch {:<3} loss={:<.4} base_loss={:<.4} fair_loss={:<.4} [{:<.1} s]",
                epoch + 1,
                stats.loss,
                stats.base_loss,
                stats.fairness_loss,
                epoch_start.elapsed().as_secs_f64()
            );

            if let Some(step) = stats.diverged_at {
                if epoch == 0 && step == 0 {
                    return Err(TrainerError::DivergedAtStart);
                }
                warn!(
                    "non-finite prediction at step {} of epoch {}, halting pre-training",
                    step,
                    epoch + 1
                );
                self.time_log
                    .push(("pre-train".to_string(), phase_start.elapsed().as_secs_f64()));
                return Ok(PretrainOutcome::Diverged { epoch });
            }
        }

        self.time_log
            .push(("pre-train".to_string(), phase_start.elapsed().as_secs_f64()));
        Ok(PretrainOutcome::Finished)
    }

    /// Fine-tune snapshots 1..M-1 in order. Snapshots at or below the
    /// threshold keep their externally produced checkpoints untouched.
    fn fine_tune(
        &mut self,
        model: &mut dyn RecommenderModel,
        stream: &EdgeListStore,
        ctx: &LossContext<'_>,
        threshold: i64,
    ) -> Result<Vec<usize>> {
        let mut checkpoints = Vec::new();

        for snap_idx in 1..self.boundaries.len() {
            let Some(range) = self.boundaries.range(snap_idx) else {
                break;
            };
            let examples = stream.slice(range);
            let period_start = Instant::now();
            info!("snapshot {}: {} interactions", snap_idx, examples.len());

            if (snap_idx as i64) > threshold {
                for pass in 0..self.config.tune_epochs {
                    let stats = self.run_pass(model, examples, ctx, false, pass)?;
                    info!(
                        "Epoch {:<3} loss={:<.4} base_loss={:<.4} fair_loss={:<.4}",
                        pass + 1,
                        stats.loss,
                        stats.base_loss,
                        stats.fairness_loss
                    );
                    if let Some(step) = stats.diverged_at {
                        warn!(
                            "non-finite prediction at step {} of pass {}, aborting pass",
                            step,
                            pass + 1
                        );
                    }
                }
            } else {
                debug!("snapshot {} at or below threshold {}, no passes", snap_idx, threshold);
            }

            if threshold >= 0 && (snap_idx as i64) <= threshold {
                debug!(
                    "snapshot {} checkpoint assumed written by an external run, keeping it",
                    snap_idx
                );
            } else {
                model.save(&format!("_snap{snap_idx}"))?;
                checkpoints.push(snap_idx);
            }

            self.time_log.push((
                format!("period_{snap_idx}"),
                period_start.elapsed().as_secs_f64(),
            ));
        }

        Ok(checkpoints)
    }

    /// One pass over a window of the stream. Shuffled passes reorder the
    /// examples deterministically from the run seed and pass index.
    fn run_pass(
        &self,
        model: &mut dyn RecommenderModel,
        examples: &[Interaction],
        ctx: &LossContext<'_>,
        shuffle: bool,
        pass_idx: usize,
    ) -> Result<PassStats> {
        let order: Vec<usize> = if shuffle {
            shuffled_indices(examples.len(), self.config.seed + pass_idx as i64 + 1)
        } else {
            (0..examples.len()).collect()
        };

        let mut losses = Vec::new();
        let mut base_losses = Vec::new();
        let mut fairness_losses = Vec::new();
        let mut parities = Vec::new();
        let mut weights = Vec::new();
        let mut diverged_at = None;
        let mut steps = 0usize;

        for (step_idx, chunk) in order.chunks(self.config.batch_size.max(1)).enumerate() {
            let batch = MicroBatch::new(chunk.iter().map(|&idx| examples[idx]).collect());
            let outcome = self.trainer.step(model, &batch, ctx)?;

            losses.push(outcome.loss);
            base_losses.push(outcome.base_loss);
            if let Some(v) = outcome.fairness_loss {
                fairness_losses.push(v);
            }
            if let Some(v) = outcome.parity {
                parities.push(v);
            }
            if let Some(v) = outcome.fairness_weight {
                weights.push(v);
            }
            steps += 1;

            if outcome.diverged {
                diverged_at = Some(step_idx);
                break;
            }
        }

        Ok(PassStats {
            loss: mean_or_zero(&losses),
            base_loss: mean_or_zero(&base_losses),
            fairness_loss: mean_or_zero(&fairness_losses),
            parity: mean_or_zero(&parities),
            fairness_weight: mean_or_zero(&weights),
            steps,
            diverged_at,
        })
    }
}

enum PretrainOutcome {
    Finished,
    Stopped { skip_evaluation: bool },
    Diverged { epoch: usize },
}

/// Deterministic Fisher-Yates permutation of `0..n`.
fn shuffled_indices(n: usize, seed: i64) -> Vec<usize> {
    let mut rng = LcgRng::new(seed);
    let mut order: Vec<usize> = (0..n).collect();
    for i in 0..n.saturating_sub(1) {
        let j = i + rng.next_range((n - i) as i64) as usize;
        order.swap(i, j);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shuffle_is_deterministic_per_seed() {
        let a = shuffled_indices(50, 7);
        let b = shuffled_indices(50, 7);
        let c = shuffled_indices(50, 8);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_eval_termination_needs_history() {
        // Short histories never terminate.
        assert!(!eval_termination(&[0.5, 0.4, 0.3], 3));
    }

    #[test]
    fn test_eval_termination_on_non_increasing_tail() {
        let mut history: Vec<f64> = (0..21).map(|i| i as f64 * 0.01).collect();
        history.extend([0.30, 0.29, 0.28]);
        assert!(eval_termination(&history, 3));

        // A rising tail keeps training.
        let mut rising: Vec<f64> = (0..21).map(|i| i as f64 * 0.01).collect();
        rising.extend([0.30, 0.31, 0.32]);
        assert!(!eval_termination(&rising, 3));
    }

    #[test]
    fn test_eval_termination_on_stale_best() {
        // Best score at index 0, 25 epochs ago.
        let mut history = vec![0.9];
        history.extend(std::iter::repeat(0.5).take(25));
        assert!(eval_termination(&history, 30));
    }

    #[test]
    fn test_mean_or_zero_on_empty() {
        assert_eq!(mean_or_zero(&[]), 0.0);
        assert!((mean_or_zero(&[1.0, 2.0]) - 1.5).abs() < 1e-12);
    }
}
