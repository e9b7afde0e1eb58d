//! Integration tests for the snapshot scheduler
//!
//! Checkpoint policy per training mode, divergence handling, and
//! cooperative cancellation, driven through the model capability trait.

use fairrec_core::model::LossContext;
use fairrec_core::testutil::StubModel;
use fairrec_core::types::{Interaction, SnapshotBoundaries};
use fairrec_core::EdgeListStore;
use fairrec_trainer::config::{RunConfig, TrainingMode};
use fairrec_trainer::errors::TrainerError;
use fairrec_trainer::mf::{MatrixFactorization, MfConfig};
use fairrec_trainer::scheduler::{
    CancelToken, RunOutcome, SnapshotScheduler, StopDecider, StopDecision,
};
use tempfile::tempdir;

/// A stream of 400 interactions cycling over 8 users and 20 items.
fn stream() -> EdgeListStore {
    let edges = (0..400)
        .map(|i| Interaction::new((i % 8) as u32, (i % 20) as u32))
        .collect();
    EdgeListStore::from_edges(edges)
}

fn boundaries() -> SnapshotBoundaries {
    SnapshotBoundaries::new(vec![100, 250, 400]).unwrap()
}

fn config(mode: TrainingMode) -> RunConfig {
    RunConfig {
        epochs: 2,
        tune_epochs: 2,
        batch_size: 32,
        mode,
        ..RunConfig::default()
    }
}

struct FixedDecider(StopDecision);

impl StopDecider for FixedDecider {
    fn on_interrupt(&mut self) -> StopDecision {
        self.0
    }
}

fn run(
    mode: TrainingMode,
    model: &mut StubModel,
    cancel: CancelToken,
    decision: StopDecision,
) -> Result<(RunOutcome, Vec<(String, f64)>), TrainerError> {
    let mut scheduler = SnapshotScheduler::new(config(mode), boundaries(), cancel);
    let outcome = scheduler.run(
        model,
        &stream(),
        &LossContext::default(),
        &mut FixedDecider(decision),
        0,
    )?;
    Ok((outcome, scheduler.time_log().to_vec()))
}

#[test]
fn test_finetune_processes_later_snapshots_in_order() -> Result<(), TrainerError> {
    let mut model = StubModel::new();
    let (outcome, time_log) = run(
        TrainingMode::FineTune { threshold: -1 },
        &mut model,
        CancelToken::new(),
        StopDecision::EvaluateCheckpoints,
    )?;

    // Snapshot 0 is covered by pre-training; the fine-tune phase walks
    // snapshots 1 and 2 in order, each persisted exactly once.
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            checkpoints: vec![0, 1, 2]
        }
    );
    assert_eq!(
        model.saved.borrow().as_slice(),
        ["_snap0", "_snap1", "_snap2"]
    );

    let phases: Vec<&str> = time_log.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(phases, ["pre-train", "period_1", "period_2"]);

    Ok(())
}

#[test]
fn test_modi_fine_keeps_external_checkpoints() -> Result<(), TrainerError> {
    let mut model = StubModel::new();
    let (outcome, _) = run(
        TrainingMode::FineTune { threshold: 1 },
        &mut model,
        CancelToken::new(),
        StopDecision::EvaluateCheckpoints,
    )?;

    // Snapshot 1 is at the threshold: no overwrite, no passes.
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            checkpoints: vec![0, 2]
        }
    );
    assert_eq!(model.saved.borrow().as_slice(), ["_snap0", "_snap2"]);

    Ok(())
}

#[test]
fn test_pretrain_mode_seeds_every_boundary() -> Result<(), TrainerError> {
    let mut model = StubModel::new();
    let (outcome, _) = run(
        TrainingMode::PreTrain,
        &mut model,
        CancelToken::new(),
        StopDecision::EvaluateCheckpoints,
    )?;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            checkpoints: vec![0, 1, 2]
        }
    );
    assert_eq!(
        model.saved.borrow().as_slice(),
        ["_snap0", "_snap1", "_snap2"]
    );

    Ok(())
}

#[test]
fn test_fulltrain_mode_writes_single_tagged_checkpoint() -> Result<(), TrainerError> {
    let mut model = StubModel::new();
    let mut scheduler = SnapshotScheduler::new(
        config(TrainingMode::FullTrain),
        boundaries(),
        CancelToken::new(),
    );
    let outcome = scheduler.run(
        &mut model,
        &stream(),
        &LossContext::default(),
        &mut FixedDecider(StopDecision::EvaluateCheckpoints),
        2,
    )?;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            checkpoints: vec![2]
        }
    );
    assert_eq!(model.saved.borrow().as_slice(), ["_snap2"]);

    Ok(())
}

#[test]
fn test_divergence_at_first_step_is_unrecoverable() {
    let mut model = StubModel::new().with_nan_at_step(0);
    let result = run(
        TrainingMode::FineTune { threshold: -1 },
        &mut model,
        CancelToken::new(),
        StopDecision::EvaluateCheckpoints,
    );

    assert!(matches!(result, Err(TrainerError::DivergedAtStart)));
}

#[test]
fn test_later_divergence_halts_without_checkpoints() -> Result<(), TrainerError> {
    // Diverge mid-way through the first pre-training epoch (step 2).
    let mut model = StubModel::new().with_nan_at_step(2);
    let (outcome, _) = run(
        TrainingMode::FineTune { threshold: -1 },
        &mut model,
        CancelToken::new(),
        StopDecision::EvaluateCheckpoints,
    )?;

    assert_eq!(outcome, RunOutcome::Diverged { epoch: 0 });
    assert!(model.saved.borrow().is_empty());

    Ok(())
}

#[test]
fn test_cancellation_respects_operator_decision() -> Result<(), TrainerError> {
    let cancel = CancelToken::new();
    cancel.cancel();

    let mut model = StubModel::new();
    let (outcome, _) = run(
        TrainingMode::FineTune { threshold: -1 },
        &mut model,
        cancel.clone(),
        StopDecision::SkipEvaluation,
    )?;
    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            skip_evaluation: true
        }
    );

    let mut model = StubModel::new();
    let (outcome, _) = run(
        TrainingMode::FineTune { threshold: -1 },
        &mut model,
        cancel,
        StopDecision::EvaluateCheckpoints,
    )?;
    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            skip_evaluation: false
        }
    );

    Ok(())
}

#[test]
fn test_end_to_end_with_bundled_model() -> Result<(), TrainerError> {
    let dir = tempdir().expect("tempdir");
    let stream = stream();
    let mut model = MatrixFactorization::new(
        MfConfig {
            num_users: 8,
            num_items: 20,
            factors: 8,
            seed: 42,
        },
        dir.path().join("model"),
    );

    let mut scheduler = SnapshotScheduler::new(
        config(TrainingMode::FineTune { threshold: -1 }),
        boundaries(),
        CancelToken::new(),
    );
    let outcome = scheduler.run(
        &mut model,
        &stream,
        &LossContext::default(),
        &mut FixedDecider(StopDecision::EvaluateCheckpoints),
        0,
    )?;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            checkpoints: vec![0, 1, 2]
        }
    );

    // Every checkpoint lands on disk with its hash sidecar, and loading
    // the same tag restores state.
    use fairrec_core::model::RecommenderModel;
    for idx in 0..3 {
        assert!(dir.path().join(format!("model_snap{idx}")).exists());
        assert!(dir.path().join(format!("model_snap{idx}.hash")).exists());
    }
    model.load("_snap1")?;

    Ok(())
}
