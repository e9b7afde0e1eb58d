//! Optimizer factory and update rules
//!
//! The optimizer is chosen once per run from a fixed enumeration; an
//! unrecognized name is a fatal configuration error. State (accumulators,
//! moments) is allocated lazily per parameter row.

use crate::errors::{RecCoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The fixed set of supported optimizers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Gd,
    Adagrad,
    Adadelta,
    Adam,
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Gd => "gd",
            OptimizerKind::Adagrad => "adagrad",
            OptimizerKind::Adadelta => "adadelta",
            OptimizerKind::Adam => "adam",
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptimizerKind {
    type Err = RecCoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gd" => Ok(OptimizerKind::Gd),
            "adagrad" => Ok(OptimizerKind::Adagrad),
            "adadelta" => Ok(OptimizerKind::Adadelta),
            "adam" => Ok(OptimizerKind::Adam),
            other => Err(RecCoreError::Config(format!("unknown optimizer: {other}"))),
        }
    }
}

/// Hyper-parameters shared by every optimizer kind.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub kind: OptimizerKind,
    pub learning_rate: f64,
    pub weight_decay: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::Adam,
            learning_rate: 0.001,
            weight_decay: 1e-4,
        }
    }
}

/// Identifies one parameter row: (parameter-group tag, row index).
pub type ParamKey = (u32, u64);

#[derive(Clone, Debug, Default)]
struct ParamState {
    acc: Vec<f64>,
    acc2: Vec<f64>,
    step: u64,
}

/// Applies per-row gradient updates with lazily allocated state.
#[derive(Clone, Debug)]
pub struct Optimizer {
    config: OptimizerConfig,
    state: HashMap<ParamKey, ParamState>,
}

const EPS: f64 = 1e-8;
const ADADELTA_RHO: f64 = 0.9;
const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            state: HashMap::new(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Apply one update to a parameter row given its gradient.
    pub fn apply(&mut self, key: ParamKey, params: &mut [f64], grad: &[f64]) {
        debug_assert_eq!(params.len(), grad.len());
        let lr = self.config.learning_rate;
        let l2 = self.config.weight_decay;

        let entry = self.state.entry(key).or_default();
        if entry.acc.len() != params.len() {
            entry.acc = vec![0.0; params.len()];
            entry.acc2 = vec![0.0; params.len()];
            entry.step = 0;
        }
        entry.step += 1;

        match self.config.kind {
            OptimizerKind::Gd => {
                for (p, g) in params.iter_mut().zip(grad) {
                    let g = g + l2 * *p;
                    *p -= lr * g;
                }
            }
            OptimizerKind::Adagrad => {
                for ((p, g), acc) in params.iter_mut().zip(grad).zip(entry.acc.iter_mut()) {
                    let g = g + l2 * *p;
                    *acc += g * g;
                    *p -= lr * g / (acc.sqrt() + EPS);
                }
            }
            OptimizerKind::Adadelta => {
                for (((p, g), acc), acc2) in params
                    .iter_mut()
                    .zip(grad)
                    .zip(entry.acc.iter_mut())
                    .zip(entry.acc2.iter_mut())
                {
                    let g = g + l2 * *p;
                    *acc = ADADELTA_RHO * *acc + (1.0 - ADADELTA_RHO) * g * g;
                    let update = ((*acc2 + EPS).sqrt() / (*acc + EPS).sqrt()) * g;
                    *acc2 = ADADELTA_RHO * *acc2 + (1.0 - ADADELTA_RHO) * update * update;
                    *p -= lr * update;
                }
            }
            OptimizerKind::Adam => {
                let t = entry.step as f64;
                let bias1 = 1.0 - ADAM_BETA1.powf(t);
                let bias2 = 1.0 - ADAM_BETA2.powf(t);
                for (((p, g), m), v) in params
                    .iter_mut()
                    .zip(grad)
                    .zip(entry.acc.iter_mut())
                    .zip(entry.acc2.iter_mut())
                {
                    let g = g + l2 * *p;
                    *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
                    *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *p -= lr * m_hat / (v_hat.sqrt() + EPS);
                }
            }
        }
    }
}
