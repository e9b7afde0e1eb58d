//! FairRec Core - data model and fairness-aware ranking evaluation
//!
//! Provides the interaction store, deterministic candidate sampling,
//! top-K ranking metrics, and per-group fairness aggregation used by the
//! continual-training scheduler.

pub mod attributes;
pub mod edges;
pub mod errors;
pub mod evaluator;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod ranking;
pub mod report;
pub mod sampling;
#[doc(hidden)]
pub mod testutil;
pub mod types;

pub use attributes::{AttrDimension, AttributeTable};
pub use edges::EdgeListStore;
pub use errors::{RecCoreError, Result};
pub use evaluator::{EvalConfig, EvalReport, EvalSetting, FairnessEvaluator};
pub use metrics::Metric;
pub use model::{LossContext, LossTerms, MicroBatch, ParamSelection, Prediction, RecommenderModel};
pub use optimizer::{Optimizer, OptimizerConfig, OptimizerKind};
pub use ranking::{RankedList, RecListConfig};
pub use sampling::LcgRng;
pub use types::{AttrValue, Interaction, ItemId, SnapshotBoundaries, UserId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
