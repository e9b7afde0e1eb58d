//! Recommendation list generation
//!
//! For one user the candidate set is the union of their test-positive
//! items and a fixed-size uniform negative sample drawn from items the
//! user has never interacted with. Candidates are scored by the model and
//! stable-sorted by descending relevance.

use crate::edges::EdgeListStore;
use crate::errors::{RecCoreError, Result};
use crate::model::RecommenderModel;
use crate::sampling::{sample_without_replacement, LcgRng};
use crate::types::{ItemId, UserId};
use std::collections::BTreeSet;

/// Candidate-list construction parameters.
#[derive(Clone, Copy, Debug)]
pub struct RecListConfig {
    /// Truncation length; 0 keeps the full ranked candidate list.
    pub top_k: usize,
    /// Negative sample size; `None` ranks every eligible negative.
    pub num_negatives: Option<usize>,
}

impl Default for RecListConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            num_negatives: Some(100),
        }
    }
}

/// One user's ranked recommendation list.
#[derive(Clone, Debug)]
pub struct RankedList {
    pub items: Vec<ItemId>,
    /// Candidates outside the training item vocabulary.
    pub unseen_candidates: usize,
}

/// Build the ranked list for `user`.
///
/// The negative pool is `train items - train_pos(user) - test_pos(user)`;
/// asking for more negatives than the pool holds signals a data
/// configuration defect and fails loudly.
pub fn generate_for_user(
    model: &dyn RecommenderModel,
    user: UserId,
    train: &EdgeListStore,
    test: &EdgeListStore,
    config: &RecListConfig,
    rng: &mut LcgRng,
) -> Result<RankedList> {
    let empty = BTreeSet::new();
    let train_pos = train.positives(user).unwrap_or(&empty);
    let test_pos = test.positives(user).unwrap_or(&empty);

    let pool: Vec<ItemId> = train
        .items()
        .iter()
        .copied()
        .filter(|item| !train_pos.contains(item) && !test_pos.contains(item))
        .collect();

    let negatives = match config.num_negatives {
        Some(n) => sample_without_replacement(&pool, n, rng).map_err(|_| {
            RecCoreError::Config(format!(
                "negative sample size {} exceeds eligible pool of {} for user {} \
                 ({} train items, {} train positives, {} test positives)",
                n,
                pool.len(),
                user,
                train.items().len(),
                train_pos.len(),
                test_pos.len()
            ))
        })?,
        None => pool,
    };

    let mut candidates: Vec<ItemId> = test_pos.iter().copied().collect();
    candidates.extend(negatives);

    let scores = model.relevance(user, &candidates)?;
    if scores.len() != candidates.len() {
        return Err(RecCoreError::Model(format!(
            "model returned {} scores for {} candidates",
            scores.len(),
            candidates.len()
        )));
    }

    let unseen_candidates = candidates
        .iter()
        .filter(|item| !train.items().contains(item))
        .count();

    // Stable sort keeps original candidate order among ties.
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut items: Vec<ItemId> = order.into_iter().map(|idx| candidates[idx]).collect();
    if config.top_k > 0 {
        items.truncate(config.top_k);
    }

    Ok(RankedList {
        items,
        unseen_candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubModel;
    use crate::types::Interaction;

    fn stores() -> (EdgeListStore, EdgeListStore) {
        let train = EdgeListStore::from_edges(vec![
            Interaction::new(0, 1),
            Interaction::new(0, 2),
            Interaction::new(1, 3),
            Interaction::new(1, 4),
            Interaction::new(2, 5),
        ]);
        let test = EdgeListStore::from_edges(vec![Interaction::new(0, 3)]);
        (train, test)
    }

    #[test]
    fn test_ranked_by_descending_score() -> Result<()> {
        let (train, test) = stores();
        let model = StubModel::new()
            .with_score(0, 3, 0.9)
            .with_score(0, 4, 0.5)
            .with_score(0, 5, 0.7);
        let config = RecListConfig {
            top_k: 0,
            num_negatives: None,
        };

        // User 0: test positive {3}, negatives {4, 5}.
        let list =
            generate_for_user(&model, 0, &train, &test, &config, &mut LcgRng::new(10))?;
        assert_eq!(list.items, vec![3, 5, 4]);
        assert_eq!(list.unseen_candidates, 0);

        Ok(())
    }

    #[test]
    fn test_truncation_and_unseen_count() -> Result<()> {
        let (train, _) = stores();
        // Item 99 never appears in training.
        let test = EdgeListStore::from_edges(vec![
            Interaction::new(0, 3),
            Interaction::new(0, 99),
        ]);

        let model = StubModel::new()
            .with_score(0, 3, 0.9)
            .with_score(0, 99, 0.8)
            .with_score(0, 4, 0.5)
            .with_score(0, 5, 0.7);
        let config = RecListConfig {
            top_k: 2,
            num_negatives: None,
        };

        let list =
            generate_for_user(&model, 0, &train, &test, &config, &mut LcgRng::new(10))?;
        assert_eq!(list.items, vec![3, 99]);
        assert_eq!(list.unseen_candidates, 1);

        Ok(())
    }

    #[test]
    fn test_oversized_negative_request_fails_loudly() {
        let (train, test) = stores();
        let model = StubModel::new();
        let config = RecListConfig {
            top_k: 5,
            num_negatives: Some(50),
        };

        let result = generate_for_user(&model, 0, &train, &test, &config, &mut LcgRng::new(10));
        assert!(matches!(result, Err(RecCoreError::Config(_))));
    }

    #[test]
    fn test_ties_keep_candidate_order() -> Result<()> {
        let (train, test) = stores();
        // All scores equal: candidate construction order must survive.
        let model = StubModel::new()
            .with_score(0, 3, 0.5)
            .with_score(0, 4, 0.5)
            .with_score(0, 5, 0.5);
        let config = RecListConfig {
            top_k: 0,
            num_negatives: None,
        };

        let list =
            generate_for_user(&model, 0, &train, &test, &config, &mut LcgRng::new(10))?;
        assert_eq!(list.items, vec![3, 4, 5]);

        Ok(())
    }
}
