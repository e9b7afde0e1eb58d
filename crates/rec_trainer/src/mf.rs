//! Bundled matrix-factorization model
//!
//! A compact reference implementation of the model capability trait:
//! embedding tables scored by dot product, pairwise logistic loss against
//! one deterministically sampled negative, updates through the attached
//! optimizer. Checkpoints are bincode payloads with a BLAKE3 hash sidecar
//! that is verified on load.

use fairrec_core::model::{
    LossContext, LossTerms, MicroBatch, ParamSelection, Prediction, RecommenderModel,
};
use fairrec_core::{ItemId, LcgRng, Optimizer, RecCoreError, Result, UserId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const GROUP_USER: u32 = 0;
const GROUP_ITEM: u32 = 1;

/// Model hyper-parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MfConfig {
    pub num_users: usize,
    pub num_items: usize,
    pub factors: usize,
    pub seed: i64,
}

impl Default for MfConfig {
    fn default() -> Self {
        Self {
            num_users: 0,
            num_items: 0,
            factors: 16,
            seed: 42,
        }
    }
}

/// Serialized checkpoint payload.
#[derive(Serialize, Deserialize)]
struct MfState {
    user_factors: Vec<Vec<f64>>,
    item_factors: Vec<Vec<f64>>,
}

/// Matrix-factorization recommender with deterministic initialization.
pub struct MatrixFactorization {
    config: MfConfig,
    checkpoint_base: PathBuf,
    user_factors: Vec<Vec<f64>>,
    item_factors: Vec<Vec<f64>>,
    optimizer: Option<Optimizer>,
    selection: ParamSelection,
    rng: LcgRng,
    training: bool,
}

impl MatrixFactorization {
    pub fn new(config: MfConfig, checkpoint_base: impl Into<PathBuf>) -> Self {
        let mut rng = LcgRng::new(config.seed);
        let mut init_table = |rows: usize, cols: usize| -> Vec<Vec<f64>> {
            (0..rows)
                .map(|_| {
                    (0..cols)
                        .map(|_| (rng.next_range(2001) - 1000) as f64 / 10_000.0)
                        .collect()
                })
                .collect()
        };

        let user_factors = init_table(config.num_users, config.factors);
        let item_factors = init_table(config.num_items, config.factors);
        let sample_rng = LcgRng::new(config.seed.wrapping_add(1));

        Self {
            config,
            checkpoint_base: checkpoint_base.into(),
            user_factors,
            item_factors,
            optimizer: None,
            selection: ParamSelection::Customized,
            rng: sample_rng,
            training: true,
        }
    }

    fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    /// Relevance for one pair; items or users outside the embedding
    /// tables (unseen during training) score zero.
    fn score(&self, user: UserId, item: ItemId) -> f64 {
        match (
            self.user_factors.get(user as usize),
            self.item_factors.get(item as usize),
        ) {
            (Some(u), Some(i)) => Self::dot(u, i),
            _ => 0.0,
        }
    }

    /// Parameter-group policy chosen when the optimizer was attached.
    pub fn selection(&self) -> ParamSelection {
        self.selection
    }

    fn checkpoint_path(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.checkpoint_base.display(), suffix))
    }

    fn hash_path(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}.hash", self.checkpoint_base.display(), suffix))
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    /// Numerically stable softplus for the pairwise loss.
    fn softplus(x: f64) -> f64 {
        x.max(0.0) + (-x.abs()).exp().ln_1p()
    }
}

impl RecommenderModel for MatrixFactorization {
    fn train_step(&mut self, batch: &MicroBatch) -> Result<Prediction> {
        let Self {
            config,
            user_factors,
            item_factors,
            optimizer,
            rng,
            ..
        } = self;
        let optimizer = optimizer
            .as_mut()
            .ok_or_else(|| RecCoreError::Model("optimizer not attached".to_string()))?;

        let mut margins = Vec::with_capacity(batch.len());
        for interaction in &batch.interactions {
            let user = interaction.user as usize;
            let pos = interaction.item as usize;
            if user >= config.num_users || pos >= config.num_items {
                return Err(RecCoreError::Model(format!(
                    "interaction ({}, {}) outside the embedding tables",
                    interaction.user, interaction.item
                )));
            }

            // One uniformly sampled negative per positive.
            let mut neg = rng.next_range(config.num_items as i64) as usize;
            if neg == pos {
                neg = (neg + 1) % config.num_items;
            }

            let margin = Self::dot(&user_factors[user], &item_factors[pos])
                - Self::dot(&user_factors[user], &item_factors[neg]);
            // d/dmargin of softplus(-margin)
            let coeff = -Self::sigmoid(-margin);

            let user_grad: Vec<f64> = item_factors[pos]
                .iter()
                .zip(&item_factors[neg])
                .map(|(p, n)| coeff * (p - n))
                .collect();
            let pos_grad: Vec<f64> = user_factors[user].iter().map(|u| coeff * u).collect();
            let neg_grad: Vec<f64> = user_factors[user].iter().map(|u| -coeff * u).collect();

            optimizer.apply((GROUP_USER, user as u64), &mut user_factors[user], &user_grad);
            optimizer.apply((GROUP_ITEM, pos as u64), &mut item_factors[pos], &pos_grad);
            optimizer.apply((GROUP_ITEM, neg as u64), &mut item_factors[neg], &neg_grad);

            margins.push(margin);
        }

        Ok(Prediction(margins))
    }

    fn loss(
        &self,
        prediction: &Prediction,
        _batch: &MicroBatch,
        _ctx: &LossContext<'_>,
    ) -> LossTerms {
        let n = prediction.0.len().max(1);
        let base = prediction.0.iter().map(|m| Self::softplus(-m)).sum::<f64>() / n as f64;

        LossTerms {
            total: base,
            base,
            fairness: None,
            parity: None,
            fairness_weight: None,
        }
    }

    fn relevance(&self, user: UserId, candidates: &[ItemId]) -> Result<Vec<f64>> {
        Ok(candidates
            .iter()
            .map(|item| self.score(user, *item))
            .collect())
    }

    fn attach_optimizer(&mut self, optimizer: Optimizer, selection: ParamSelection) {
        self.optimizer = Some(optimizer);
        self.selection = selection;
    }

    fn has_optimizer(&self) -> bool {
        self.optimizer.is_some()
    }

    fn save(&self, suffix: &str) -> Result<()> {
        let path = self.checkpoint_path(suffix);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let state = MfState {
            user_factors: self.user_factors.clone(),
            item_factors: self.item_factors.clone(),
        };
        let data = bincode::serialize(&state)
            .map_err(|e| RecCoreError::Serialization(e.to_string()))?;

        std::fs::write(&path, &data)?;
        let hash = blake3::hash(&data);
        std::fs::write(self.hash_path(suffix), hex::encode(hash.as_bytes()))?;

        debug!("checkpoint written: {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    fn load(&mut self, suffix: &str) -> Result<()> {
        let path = self.checkpoint_path(suffix);
        let data = std::fs::read(&path)?;

        let hash_path = self.hash_path(suffix);
        if hash_path.exists() {
            let expected = std::fs::read_to_string(&hash_path)?;
            let actual = hex::encode(blake3::hash(&data).as_bytes());
            if expected.trim() != actual {
                return Err(RecCoreError::Integrity(format!(
                    "checkpoint hash mismatch for {}",
                    path.display()
                )));
            }
        }

        let state: MfState = bincode::deserialize(&data)
            .map_err(|e| RecCoreError::Serialization(e.to_string()))?;
        self.config.num_users = state.user_factors.len();
        self.config.num_items = state.item_factors.len();
        self.user_factors = state.user_factors;
        self.item_factors = state.item_factors;

        debug!("checkpoint loaded: {}", path.display());
        Ok(())
    }

    fn train_mode(&mut self) {
        self.training = true;
    }

    fn eval_mode(&mut self) {
        self.training = false;
    }
}
