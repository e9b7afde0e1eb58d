//! Test support: a scriptable model stub
//!
//! Used by unit and integration tests across the workspace. Not part of
//! the public contract.

use crate::errors::Result;
use crate::model::{
    LossContext, LossTerms, MicroBatch, ParamSelection, Prediction, RecommenderModel,
};
use crate::optimizer::Optimizer;
use crate::types::{ItemId, UserId};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Model stub with a fixed relevance table and scriptable divergence.
#[derive(Default)]
pub struct StubModel {
    scores: BTreeMap<(UserId, ItemId), f64>,
    /// Emit a non-finite prediction on this 0-based training step.
    pub nan_at_step: Option<usize>,
    pub steps_taken: usize,
    pub saved: RefCell<Vec<String>>,
    pub loaded: RefCell<Vec<String>>,
    optimizer: Option<Optimizer>,
    pub training: bool,
}

impl StubModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, user: UserId, item: ItemId, score: f64) -> Self {
        self.scores.insert((user, item), score);
        self
    }

    /// Diverge (emit NaN) on the given 0-based training step.
    pub fn with_nan_at_step(mut self, step: usize) -> Self {
        self.nan_at_step = Some(step);
        self
    }

    pub fn set_score(&mut self, user: UserId, item: ItemId, score: f64) {
        self.scores.insert((user, item), score);
    }
}

impl RecommenderModel for StubModel {
    fn train_step(&mut self, batch: &MicroBatch) -> Result<Prediction> {
        let diverge = self.nan_at_step == Some(self.steps_taken);
        self.steps_taken += 1;

        let value = if diverge { f64::NAN } else { 0.1 };
        Ok(Prediction(vec![value; batch.len().max(1)]))
    }

    fn loss(
        &self,
        prediction: &Prediction,
        _batch: &MicroBatch,
        _ctx: &LossContext<'_>,
    ) -> LossTerms {
        let total = if prediction.is_finite() { 0.5 } else { f64::NAN };
        LossTerms {
            total,
            base: total,
            fairness: None,
            parity: None,
            fairness_weight: None,
        }
    }

    fn relevance(&self, user: UserId, candidates: &[ItemId]) -> Result<Vec<f64>> {
        Ok(candidates
            .iter()
            .map(|item| self.scores.get(&(user, *item)).copied().unwrap_or(0.0))
            .collect())
    }

    fn attach_optimizer(&mut self, optimizer: Optimizer, _selection: ParamSelection) {
        self.optimizer = Some(optimizer);
    }

    fn has_optimizer(&self) -> bool {
        self.optimizer.is_some()
    }

    fn save(&self, suffix: &str) -> Result<()> {
        self.saved.borrow_mut().push(suffix.to_string());
        Ok(())
    }

    fn load(&mut self, suffix: &str) -> Result<()> {
        self.loaded.borrow_mut().push(suffix.to_string());
        Ok(())
    }

    fn train_mode(&mut self) {
        self.training = true;
    }

    fn eval_mode(&mut self) {
        self.training = false;
    }
}
