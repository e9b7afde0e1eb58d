//! FairRec training CLI
//!
//! Continual trainer over temporally ordered interaction snapshots with
//! per-snapshot fairness evaluation.

use anyhow::{Context, Result};
use clap::Parser;
use fairrec_core::evaluator::{resolve_setting_files, EvalConfig, EvalSetting, FairnessEvaluator};
use fairrec_core::model::{LossContext, RecommenderModel};
use fairrec_core::ranking::RecListConfig;
use fairrec_core::report::{
    write_mean_summary, write_snapshot_report, write_time_log, write_trend_summary,
};
use fairrec_core::{
    AttrDimension, AttributeTable, EdgeListStore, Metric, OptimizerKind, ParamSelection,
    SnapshotBoundaries,
};
use fairrec_trainer::config::{parse_usize_list, RunConfig, TrainingMode};
use fairrec_trainer::mf::{MatrixFactorization, MfConfig};
use fairrec_trainer::scheduler::{CancelToken, PromptDecider, RunOutcome, SnapshotScheduler};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "fairrec-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Continual recommender training with fairness evaluation", long_about = None)]
struct Args {
    /// Interaction stream in time order (user item per line)
    #[arg(long)]
    stream: PathBuf,

    /// Snapshot end offsets over the stream, comma-separated
    #[arg(long)]
    boundaries: String,

    /// Directory holding {setting}_{train|test}_snap{i} files
    #[arg(long)]
    snapshots_dir: PathBuf,

    /// User attribute file (user attr per line)
    #[arg(long)]
    user_attr: PathBuf,

    /// Output directory for result files
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Checkpoint base path; snapshots append _snap{i}
    #[arg(long, default_value = "models/fairrec")]
    checkpoint: PathBuf,

    /// Number of pre-training epochs
    #[arg(long, default_value = "100")]
    epoch: usize,

    /// Number of fine-tuning epochs per snapshot
    #[arg(long, default_value = "10")]
    tepoch: usize,

    /// Early-stop patience over validation scores
    #[arg(long, default_value = "5")]
    early_stop: usize,

    /// Learning rate
    #[arg(long, default_value = "0.001")]
    lr: f64,

    /// Weight decay in optimizer
    #[arg(long, default_value = "1e-4")]
    l2: f64,

    /// Batch size during training
    #[arg(long, default_value = "256")]
    batch_size: usize,

    /// Batch size during testing
    #[arg(long, default_value = "256")]
    eval_batch_size: usize,

    /// Optimizer: gd, adagrad, adadelta, adam
    #[arg(long, default_value = "adam")]
    optimizer: String,

    /// Optimize all parameters instead of the customized subset
    #[arg(long)]
    all_parameters: bool,

    /// Negative samples per user during evaluation; -1 ranks everything
    #[arg(long, default_value = "100")]
    num_neg: i64,

    /// Top-K list sizes, comma-separated
    #[arg(long, default_value = "20")]
    topk: String,

    /// Evaluation metrics, comma-separated
    #[arg(
        long,
        default_value = "recall,ndcg1,ap0,mrr1,f1,hit_ratio,hit,mrr0,precision"
    )]
    metrics: String,

    /// Training mode: fulltrain, pretrain, finetune, modi-fine<N>
    #[arg(long, default_value = "finetune")]
    mode: String,

    /// Embedding dimensionality of the bundled model
    #[arg(long, default_value = "16")]
    factors: usize,

    /// Seed for deterministic shuffling and initialization
    #[arg(long, default_value = "42")]
    seed: i64,

    /// Snapshot index tag for fulltrain checkpoints
    #[arg(long, default_value = "0")]
    snap_idx: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Machine-readable summary written next to the result files.
#[derive(Serialize)]
struct RunSummary {
    mode: String,
    optimizer: String,
    seed: i64,
    boundaries: Vec<usize>,
    checkpoints: Vec<usize>,
    started_at: String,
    finished_at: String,
}

fn build_config(args: &Args) -> Result<RunConfig> {
    let optimizer: OptimizerKind = args.optimizer.parse()?;
    let mode: TrainingMode = args.mode.parse()?;
    let metrics = Metric::parse_list(&args.metrics)?;
    let top_k = parse_usize_list(&args.topk)?;
    let num_neg_samples = if args.num_neg < 0 {
        None
    } else {
        Some(args.num_neg as usize)
    };

    let config = RunConfig {
        epochs: args.epoch,
        tune_epochs: args.tepoch,
        early_stop: args.early_stop,
        learning_rate: args.lr,
        weight_decay: args.l2,
        batch_size: args.batch_size,
        eval_batch_size: args.eval_batch_size,
        optimizer,
        param_selection: if args.all_parameters {
            ParamSelection::All
        } else {
            ParamSelection::Customized
        },
        num_neg_samples,
        top_k,
        metrics,
        mode,
        snapshots_dir: args.snapshots_dir.clone(),
        result_dir: args.output.clone(),
        seed: args.seed,
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let started_at = chrono::Utc::now();

    // Configuration errors surface before any data is touched.
    let config = build_config(&args).context("Invalid configuration")?;
    let boundary_ends = parse_usize_list(&args.boundaries).context("Invalid boundaries")?;
    let boundaries = SnapshotBoundaries::new(boundary_ends.clone())?;

    info!("FairRec trainer v{}", env!("CARGO_PKG_VERSION"));
    info!("  Mode: {}", args.mode);
    info!("  Optimizer: {} (lr={}, l2={})", config.optimizer, args.lr, args.l2);
    info!("  Snapshots: {}", boundaries.len());

    // Load corpus
    info!("Loading stream from: {}", args.stream.display());
    let stream = EdgeListStore::load(&args.stream).context("Failed to load stream")?;
    info!(
        "Loaded {} interactions, {} users, {} items",
        stream.len(),
        stream.users().len(),
        stream.items().len()
    );

    let attributes = AttributeTable::load(&args.user_attr, vec![AttrDimension::binary("gender")])
        .context("Failed to load user attributes")?;
    info!("Loaded attributes for {} users", attributes.len());

    let mut model = MatrixFactorization::new(
        MfConfig {
            num_users: stream.max_user().map_or(0, |u| u as usize + 1),
            num_items: stream.max_item().map_or(0, |i| i as usize + 1),
            factors: args.factors,
            seed: args.seed,
        },
        args.checkpoint.clone(),
    );

    // Cooperative cancellation; observed between pre-training epochs.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .context("Failed to install interrupt handler")?;
    }

    let mut scheduler = SnapshotScheduler::new(config.clone(), boundaries.clone(), cancel);
    let ctx = LossContext {
        attributes: Some(&attributes),
    };
    let outcome = scheduler.run(&mut model, &stream, &ctx, &mut PromptDecider, args.snap_idx)?;

    std::fs::create_dir_all(&args.output).context("Failed to create output directory")?;
    write_time_log(&args.output.join("time_log.txt"), scheduler.time_log())?;

    let (evaluate, checkpoints) = match &outcome {
        RunOutcome::Completed { checkpoints } => (true, checkpoints.clone()),
        RunOutcome::Stopped { skip_evaluation } => {
            info!("training stopped by interrupt");
            (!skip_evaluation, Vec::new())
        }
        RunOutcome::Diverged { epoch } => {
            warn!("pre-training diverged at epoch {}, skipping evaluation", epoch + 1);
            (false, Vec::new())
        }
    };

    if evaluate {
        run_evaluation(&args, &config, &boundaries, &attributes, &mut model)?;
    }

    let summary = RunSummary {
        mode: args.mode.clone(),
        optimizer: config.optimizer.to_string(),
        seed: args.seed,
        boundaries: boundary_ends,
        checkpoints,
        started_at: started_at.to_rfc3339(),
        finished_at: chrono::Utc::now().to_rfc3339(),
    };
    let summary_path = args.output.join("run_summary.json");
    std::fs::write(
        &summary_path,
        serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?,
    )
    .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    info!("✓ Run complete; results under {}", args.output.display());
    Ok(())
}

/// Evaluate every checkpoint against every setting and top-K, writing
/// per-snapshot, mean, and trend files.
fn run_evaluation(
    args: &Args,
    config: &RunConfig,
    boundaries: &SnapshotBoundaries,
    attributes: &AttributeTable,
    model: &mut MatrixFactorization,
) -> Result<()> {
    for &k in &config.top_k {
        for setting in EvalSetting::ALL {
            let mut reports = Vec::new();

            for snap_idx in 0..boundaries.len() {
                model
                    .load(&format!("_snap{snap_idx}"))
                    .with_context(|| format!("Missing checkpoint _snap{snap_idx}"))?;
                model.eval_mode();

                let files = resolve_setting_files(&args.snapshots_dir, setting, snap_idx);
                let train = EdgeListStore::load(&files.train)?;
                let test = EdgeListStore::load(&files.test)?;
                let hist = if snap_idx == 0 {
                    None
                } else {
                    Some(EdgeListStore::load(&files.hist_train)?)
                };
                let incoming = if snap_idx == 0 {
                    None
                } else {
                    Some(EdgeListStore::load(&files.incoming)?)
                };

                let eval_config = EvalConfig {
                    metrics: config.metrics.clone(),
                    rec_list: RecListConfig {
                        top_k: k,
                        num_negatives: config.num_neg_samples,
                    },
                    ..EvalConfig::default()
                };
                let evaluator = FairnessEvaluator::new(eval_config, attributes);
                let report = evaluator.evaluate(
                    &*model,
                    &train,
                    &test,
                    hist.as_ref(),
                    incoming.as_ref(),
                    setting,
                    snap_idx,
                )?;

                let path = args
                    .output
                    .join(format!("{}_{}_snap{}.txt", k, setting.name(), snap_idx));
                write_snapshot_report(&path, &report)?;
                reports.push(report);
            }

            write_mean_summary(
                &args.output.join(format!("0_{}_mean_{}.txt", k, setting.name())),
                &reports,
            )?;
            write_trend_summary(
                &args.output.join(format!("0_{}_trend_{}.txt", k, setting.name())),
                &reports,
            )?;
            info!("evaluated setting {} at top-{}", setting.name(), k);
        }
    }

    Ok(())
}
