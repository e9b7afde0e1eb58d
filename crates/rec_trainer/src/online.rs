//! Online training step
//!
//! Applies exactly one optimization step per streamed micro-batch and
//! surfaces divergence as a flag, never a panic; the scheduler decides
//! whether a pass survives.

use crate::config::RunConfig;
use crate::errors::Result;
use fairrec_core::model::{LossContext, MicroBatch, Prediction, RecommenderModel};
use fairrec_core::{Optimizer, OptimizerConfig, ParamSelection};

/// Everything one training step produces.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub loss: f64,
    pub prediction: Prediction,
    pub base_loss: f64,
    pub fairness_loss: Option<f64>,
    pub parity: Option<f64>,
    pub fairness_weight: Option<f64>,
    /// True iff any prediction entry is non-finite.
    pub diverged: bool,
}

/// Executes single gradient updates against the model interface.
pub struct OnlineTrainer {
    optimizer: OptimizerConfig,
    selection: ParamSelection,
}

impl OnlineTrainer {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            optimizer: config.optimizer_config(),
            selection: config.param_selection,
        }
    }

    /// One update on one micro-batch. The optimizer is constructed on
    /// first use and owned by the model from then on.
    pub fn step(
        &self,
        model: &mut dyn RecommenderModel,
        batch: &MicroBatch,
        ctx: &LossContext<'_>,
    ) -> Result<StepOutcome> {
        if !model.has_optimizer() {
            model.attach_optimizer(Optimizer::new(self.optimizer), self.selection);
        }

        model.train_mode();
        let prediction = model.train_step(batch)?;
        let terms = model.loss(&prediction, batch, ctx);
        let diverged = !prediction.is_finite();

        Ok(StepOutcome {
            loss: terms.total,
            base_loss: terms.base,
            fairness_loss: terms.fairness,
            parity: terms.parity,
            fairness_weight: terms.fairness_weight,
            prediction,
            diverged,
        })
    }
}
