//! Model capability interface
//!
//! The scheduler and evaluator consume recommendation models only through
//! this trait: a training step, a loss breakdown, relevance scoring, and
//! checkpoint save/load by tag. Model internals (architecture, gradient
//! computation) stay behind the seam.

use crate::attributes::AttributeTable;
use crate::errors::Result;
use crate::optimizer::Optimizer;
use crate::types::{Interaction, ItemId, UserId};

/// One streamed example or micro-batch fed to a training step.
#[derive(Clone, Debug)]
pub struct MicroBatch {
    pub interactions: Vec<Interaction>,
}

impl MicroBatch {
    pub fn new(interactions: Vec<Interaction>) -> Self {
        Self { interactions }
    }

    pub fn single(interaction: Interaction) -> Self {
        Self {
            interactions: vec![interaction],
        }
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }
}

/// Raw model output for a training step, one entry per example.
#[derive(Clone, Debug)]
pub struct Prediction(pub Vec<f64>);

impl Prediction {
    /// False when any entry is NaN or infinite; the divergence signal.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// Loss breakdown returned by the model. Fairness terms are absent for
/// models without a fairness regularizer.
#[derive(Clone, Copy, Debug)]
pub struct LossTerms {
    pub total: f64,
    pub base: f64,
    pub fairness: Option<f64>,
    pub parity: Option<f64>,
    pub fairness_weight: Option<f64>,
}

/// Context handed to the loss computation; carries the sensitive-attribute
/// table for fairness-regularized models.
#[derive(Clone, Copy, Debug, Default)]
pub struct LossContext<'a> {
    pub attributes: Option<&'a AttributeTable>,
}

/// Which parameter groups the optimizer updates; decided once per run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamSelection {
    /// Optimize every parameter.
    All,
    /// Optimize the model's customized subset.
    Customized,
}

/// Capability set every recommendation model must satisfy.
pub trait RecommenderModel {
    /// Run one forward pass over the batch and apply one optimizer update
    /// in place. Returns the raw prediction for divergence checking.
    fn train_step(&mut self, batch: &MicroBatch) -> Result<Prediction>;

    /// Loss breakdown for an already computed prediction.
    fn loss(&self, prediction: &Prediction, batch: &MicroBatch, ctx: &LossContext<'_>)
        -> LossTerms;

    /// Relevance scores for (user, candidate) pairs, one per candidate.
    fn relevance(&self, user: UserId, candidates: &[ItemId]) -> Result<Vec<f64>>;

    /// Install the lazily constructed optimizer. Called at most once.
    fn attach_optimizer(&mut self, optimizer: Optimizer, selection: ParamSelection);

    fn has_optimizer(&self) -> bool;

    /// Persist model state under the checkpoint tag suffix (e.g. `_snap3`).
    /// The write must complete before returning.
    fn save(&self, suffix: &str) -> Result<()>;

    /// Restore model state from the checkpoint written under `suffix`.
    fn load(&mut self, suffix: &str) -> Result<()>;

    fn train_mode(&mut self);

    fn eval_mode(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_finiteness() {
        assert!(Prediction(vec![0.0, 1.5, -3.0]).is_finite());
        assert!(!Prediction(vec![0.0, f64::NAN]).is_finite());
        assert!(!Prediction(vec![f64::INFINITY]).is_finite());
        assert!(Prediction(vec![]).is_finite());
    }
}
