//! Fairness-aware ranking evaluation
//!
//! Computes per-user ranking metrics over every eligible user, aggregates
//! them overall and per sensitive-attribute group, and derives parity
//! differences for binary dimensions. Accumulators live in an explicit
//! per-call context; nothing run-wide is mutated.

use crate::attributes::AttributeTable;
use crate::edges::EdgeListStore;
use crate::errors::Result;
use crate::metrics::Metric;
use crate::model::RecommenderModel;
use crate::ranking::{generate_for_user, RecListConfig};
use crate::sampling::LcgRng;
use crate::types::{AttrValue, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Seed used for every evaluation pass unless overridden; re-seeding per
/// pass makes repeated evaluation of one checkpoint bit-for-bit identical.
pub const DEFAULT_EVAL_SEED: i64 = 10;

/// The four train/test pairings evaluated per snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalSetting {
    /// Prior cumulative train, immediately following period as test
    /// (at snapshot 0, the train file itself).
    Current,
    /// Cumulative partition as of this snapshot.
    Remain,
    /// Held-out fixed partition.
    Fixed,
    /// The next period's interactions.
    Next,
}

impl EvalSetting {
    pub const ALL: [EvalSetting; 4] = [
        EvalSetting::Current,
        EvalSetting::Remain,
        EvalSetting::Fixed,
        EvalSetting::Next,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EvalSetting::Current => "current",
            EvalSetting::Remain => "remain",
            EvalSetting::Fixed => "fixed",
            EvalSetting::Next => "next",
        }
    }

    /// Name of the setting whose train files this setting reads.
    fn train_setting(&self) -> &'static str {
        match self {
            EvalSetting::Current => "remain",
            other => other.name(),
        }
    }
}

/// Snapshot files backing one (setting, snapshot) evaluation.
#[derive(Clone, Debug)]
pub struct SettingFiles {
    pub train: PathBuf,
    pub test: PathBuf,
    /// Previous snapshot's train file, for cold-start set differences.
    pub hist_train: PathBuf,
    /// The incoming period's interactions (new users/edges).
    pub incoming: PathBuf,
}

/// Resolve the snapshot file pairing for one setting.
///
/// `current` is the irregular one: it always trains on the cumulative
/// `remain` partition, and at snapshot 0 tests on that same file
/// (bootstrapping period-0 test data); later snapshots test on the
/// previous period's `next` file.
pub fn resolve_setting_files(dir: &Path, setting: EvalSetting, snap_idx: usize) -> SettingFiles {
    let file = |prefix: &str, role: &str, idx: usize| {
        dir.join(format!("{prefix}_{role}_snap{idx}"))
    };

    let train = file(setting.train_setting(), "train", snap_idx);
    let test = match setting {
        EvalSetting::Current if snap_idx == 0 => train.clone(),
        EvalSetting::Current => file("next", "test", snap_idx - 1),
        other => file(other.name(), "test", snap_idx),
    };

    let (hist_train, incoming) = if snap_idx == 0 {
        (train.clone(), train.clone())
    } else {
        (
            file(setting.train_setting(), "train", snap_idx - 1),
            file("next", "test", snap_idx - 1),
        )
    };

    SettingFiles {
        train,
        test,
        hist_train,
        incoming,
    }
}

/// Evaluation parameters, validated before any user is scored.
#[derive(Clone, Debug)]
pub struct EvalConfig {
    pub metrics: Vec<Metric>,
    pub rec_list: RecListConfig,
    pub seed: i64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            metrics: vec![
                Metric::Recall,
                Metric::Ndcg1,
                Metric::Ap0,
                Metric::Mrr1,
                Metric::F1,
                Metric::HitRatio,
                Metric::Hit,
                Metric::Mrr0,
                Metric::Precision,
            ],
            rec_list: RecListConfig::default(),
            seed: DEFAULT_EVAL_SEED,
        }
    }
}

/// Counted anomalies from one evaluation pass; recovery is local.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct AnomalyCounters {
    /// Train users absent from the test-positive map.
    pub missing_test_pos: usize,
    /// Evaluated users absent from the attribute table (or carrying a
    /// label outside the configured groups).
    pub missing_attribute: usize,
}

/// Per-group results and population diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct GroupReport {
    pub group: AttrValue,
    pub means: Vec<(Metric, f64)>,
    /// Users actually evaluated (present in train and test).
    pub valid_users: usize,
    /// Users in the train partition carrying this label.
    pub train_users: usize,
    /// Train users absent from the previous snapshot's train users.
    pub cold_start_users: usize,
    /// Users introduced by the incoming period.
    pub new_users: usize,
    pub unseen_mean: f64,
    pub unseen_total: usize,
    pub test_pos_mean: f64,
    pub test_pos_total: usize,
    pub train_pos_mean: f64,
    pub train_pos_total: usize,
}

/// One attribute dimension's results.
#[derive(Clone, Debug, Serialize)]
pub struct DimReport {
    pub name: String,
    /// `mean(group_0) - mean(group_1)` per metric; only for binary
    /// parity-eligible dimensions.
    pub parity: Option<Vec<(Metric, f64)>>,
    pub groups: Vec<GroupReport>,
}

/// Finalized output of one evaluation pass.
#[derive(Clone, Debug, Serialize)]
pub struct EvalReport {
    pub setting: EvalSetting,
    pub snapshot: usize,
    pub top_k: usize,
    pub overall: Vec<(Metric, f64)>,
    pub dims: Vec<DimReport>,
    pub num_train_users: usize,
    pub num_eval_users: usize,
    pub anomalies: AnomalyCounters,
}

#[derive(Clone, Debug, Default)]
struct GroupAcc {
    totals: BTreeMap<Metric, f64>,
    valid_users: usize,
    unseen_total: usize,
    test_pos_total: usize,
    train_pos_total: usize,
}

/// Per-call accumulator state, discarded after finalization.
struct EvalContext {
    overall: BTreeMap<Metric, f64>,
    num_eval_users: usize,
    dims: Vec<BTreeMap<AttrValue, GroupAcc>>,
    anomalies: AnomalyCounters,
}

impl EvalContext {
    fn new(attributes: &AttributeTable) -> Self {
        let dims = attributes
            .dims()
            .iter()
            .map(|dim| {
                dim.groups
                    .iter()
                    .map(|group| (*group, GroupAcc::default()))
                    .collect()
            })
            .collect();

        Self {
            overall: BTreeMap::new(),
            num_eval_users: 0,
            dims,
            anomalies: AnomalyCounters::default(),
        }
    }
}

/// The evaluation engine for one attribute table and metric configuration.
pub struct FairnessEvaluator<'a> {
    config: EvalConfig,
    attributes: &'a AttributeTable,
}

impl<'a> FairnessEvaluator<'a> {
    pub fn new(config: EvalConfig, attributes: &'a AttributeTable) -> Self {
        Self { config, attributes }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Evaluate one model state against one train/test pairing.
    ///
    /// `hist_train` is the previous snapshot's train partition (cold-start
    /// bookkeeping); `incoming` is the arriving period (new-user counts).
    /// Either may be absent at snapshot 0.
    pub fn evaluate(
        &self,
        model: &dyn RecommenderModel,
        train: &EdgeListStore,
        test: &EdgeListStore,
        hist_train: Option<&EdgeListStore>,
        incoming: Option<&EdgeListStore>,
        setting: EvalSetting,
        snapshot: usize,
    ) -> Result<EvalReport> {
        let mut rng = LcgRng::new(self.config.seed);
        let mut ctx = EvalContext::new(self.attributes);

        for &user in train.users() {
            let test_pos = match test.positives(user) {
                Some(pos) => pos,
                None => {
                    ctx.anomalies.missing_test_pos += 1;
                    continue;
                }
            };

            let ranked = generate_for_user(
                model,
                user,
                train,
                test,
                &self.config.rec_list,
                &mut rng,
            )?;

            let values: Vec<(Metric, f64)> = self
                .config
                .metrics
                .iter()
                .map(|metric| (*metric, metric.measure(&ranked.items, test_pos)))
                .collect();

            ctx.num_eval_users += 1;
            for (metric, value) in &values {
                *ctx.overall.entry(*metric).or_insert(0.0) += value;
            }

            self.accumulate_groups(&mut ctx, user, &values, ranked.unseen_candidates, train, test);
        }

        if ctx.anomalies.missing_test_pos + ctx.anomalies.missing_attribute > 0 {
            debug!(
                missing_test_pos = ctx.anomalies.missing_test_pos,
                missing_attribute = ctx.anomalies.missing_attribute,
                "evaluation pass skipped anomalous users"
            );
        }

        Ok(self.finalize(ctx, train, hist_train, incoming, setting, snapshot))
    }

    fn accumulate_groups(
        &self,
        ctx: &mut EvalContext,
        user: UserId,
        values: &[(Metric, f64)],
        unseen: usize,
        train: &EdgeListStore,
        test: &EdgeListStore,
    ) {
        let labels = match self.attributes.get(user) {
            Some(labels) => labels,
            None => {
                ctx.anomalies.missing_attribute += 1;
                return;
            }
        };

        let mut matched_any = false;
        for (dim_idx, label) in labels.iter().enumerate() {
            let Some(acc) = ctx.dims[dim_idx].get_mut(label) else {
                continue;
            };
            matched_any = true;

            for (metric, value) in values {
                *acc.totals.entry(*metric).or_insert(0.0) += value;
            }
            acc.valid_users += 1;
            acc.unseen_total += unseen;
            acc.test_pos_total += test.positives(user).map_or(0, |p| p.len());
            acc.train_pos_total += train.positives(user).map_or(0, |p| p.len());
        }

        if !matched_any {
            ctx.anomalies.missing_attribute += 1;
        }
    }

    fn finalize(
        &self,
        ctx: EvalContext,
        train: &EdgeListStore,
        hist_train: Option<&EdgeListStore>,
        incoming: Option<&EdgeListStore>,
        setting: EvalSetting,
        snapshot: usize,
    ) -> EvalReport {
        let divide = |total: f64, count: usize| {
            if count == 0 {
                0.0
            } else {
                total / count as f64
            }
        };

        let overall: Vec<(Metric, f64)> = self
            .config
            .metrics
            .iter()
            .map(|metric| {
                let total = ctx.overall.get(metric).copied().unwrap_or(0.0);
                (*metric, divide(total, ctx.num_eval_users))
            })
            .collect();

        // Population bookkeeping per group, independent of metric values.
        let train_users_by_group = self.count_by_group(train.users());
        let cold_start_by_group = match hist_train {
            // At snapshot 0 every train user is a cold start.
            None => train_users_by_group.clone(),
            Some(hist) => {
                let cold: BTreeSet<UserId> =
                    train.users().difference(hist.users()).copied().collect();
                self.count_by_group(&cold)
            }
        };
        let new_users_by_group = match incoming {
            None => Vec::new(),
            Some(store) => self.count_by_group(store.users()),
        };

        let dims = self
            .attributes
            .dims()
            .iter()
            .enumerate()
            .map(|(dim_idx, dim)| {
                let groups: Vec<GroupReport> = dim
                    .groups
                    .iter()
                    .map(|group| {
                        let acc = ctx.dims[dim_idx]
                            .get(group)
                            .cloned()
                            .unwrap_or_default();
                        let means: Vec<(Metric, f64)> = self
                            .config
                            .metrics
                            .iter()
                            .map(|metric| {
                                let total = acc.totals.get(metric).copied().unwrap_or(0.0);
                                (*metric, divide(total, acc.valid_users))
                            })
                            .collect();

                        let lookup = |table: &[BTreeMap<AttrValue, usize>]| {
                            table
                                .get(dim_idx)
                                .and_then(|m| m.get(group))
                                .copied()
                                .unwrap_or(0)
                        };

                        GroupReport {
                            group: *group,
                            means,
                            valid_users: acc.valid_users,
                            train_users: lookup(&train_users_by_group),
                            cold_start_users: lookup(&cold_start_by_group),
                            new_users: lookup(&new_users_by_group),
                            unseen_mean: divide(acc.unseen_total as f64, acc.valid_users),
                            unseen_total: acc.unseen_total,
                            test_pos_mean: divide(acc.test_pos_total as f64, acc.valid_users),
                            test_pos_total: acc.test_pos_total,
                            train_pos_mean: divide(acc.train_pos_total as f64, acc.valid_users),
                            train_pos_total: acc.train_pos_total,
                        }
                    })
                    .collect();

                let parity = if dim.parity_eligible && groups.len() == 2 {
                    Some(
                        groups[0]
                            .means
                            .iter()
                            .zip(&groups[1].means)
                            .map(|((metric, a), (_, b))| (*metric, a - b))
                            .collect(),
                    )
                } else {
                    None
                };

                DimReport {
                    name: dim.name.clone(),
                    parity,
                    groups,
                }
            })
            .collect();

        EvalReport {
            setting,
            snapshot,
            top_k: self.config.rec_list.top_k,
            overall,
            dims,
            num_train_users: train.users().len(),
            num_eval_users: ctx.num_eval_users,
            anomalies: ctx.anomalies,
        }
    }

    /// Count a user set per (dimension, group).
    fn count_by_group(&self, users: &BTreeSet<UserId>) -> Vec<BTreeMap<AttrValue, usize>> {
        let mut counts: Vec<BTreeMap<AttrValue, usize>> = self
            .attributes
            .dims()
            .iter()
            .map(|dim| dim.groups.iter().map(|g| (*g, 0usize)).collect())
            .collect();

        for &user in users {
            let Some(labels) = self.attributes.get(user) else {
                continue;
            };
            for (dim_idx, label) in labels.iter().enumerate() {
                if let Some(count) = counts[dim_idx].get_mut(label) {
                    *count += 1;
                }
            }
        }

        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttrDimension;
    use crate::testutil::StubModel;
    use crate::types::Interaction;

    fn attributes() -> AttributeTable {
        let mut table = AttributeTable::new(vec![AttrDimension::binary("gender")]);
        table.insert(0, vec![0]);
        table.insert(1, vec![1]);
        table.insert(2, vec![0]);
        table.insert(3, vec![1]);
        table
    }

    fn train_store() -> EdgeListStore {
        EdgeListStore::from_edges(vec![
            Interaction::new(0, 10),
            Interaction::new(1, 11),
            Interaction::new(2, 12),
            Interaction::new(3, 13),
        ])
    }

    fn test_store() -> EdgeListStore {
        // User 3 is in train but absent from test.
        EdgeListStore::from_edges(vec![
            Interaction::new(0, 11),
            Interaction::new(1, 12),
            Interaction::new(2, 10),
        ])
    }

    fn eval_config() -> EvalConfig {
        EvalConfig {
            metrics: vec![Metric::Recall, Metric::HitRatio],
            rec_list: RecListConfig {
                top_k: 2,
                num_negatives: None,
            },
            seed: DEFAULT_EVAL_SEED,
        }
    }

    fn scored_model() -> StubModel {
        // User 0 ranks its positive first, users 1 and 2 miss entirely.
        StubModel::new()
            .with_score(0, 11, 0.9)
            .with_score(1, 10, 0.9)
            .with_score(1, 13, 0.8)
            .with_score(2, 11, 0.9)
            .with_score(2, 13, 0.8)
    }

    #[test]
    fn test_missing_test_user_is_counted_and_skipped() -> Result<()> {
        let attrs = attributes();
        let evaluator = FairnessEvaluator::new(eval_config(), &attrs);
        let model = scored_model();

        let report = evaluator.evaluate(
            &model,
            &train_store(),
            &test_store(),
            None,
            None,
            EvalSetting::Remain,
            0,
        )?;

        assert_eq!(report.num_train_users, 4);
        assert_eq!(report.num_eval_users, 3);
        assert_eq!(report.anomalies.missing_test_pos, 1);

        Ok(())
    }

    #[test]
    fn test_overall_mean_is_unweighted_user_mean() -> Result<()> {
        let attrs = attributes();
        let evaluator = FairnessEvaluator::new(eval_config(), &attrs);
        let model = scored_model();

        let report = evaluator.evaluate(
            &model,
            &train_store(),
            &test_store(),
            None,
            None,
            EvalSetting::Remain,
            0,
        )?;

        // Per-user recall: user 0 hits (1.0), users 1 and 2 miss (0.0).
        let recall = report
            .overall
            .iter()
            .find(|(m, _)| *m == Metric::Recall)
            .map(|(_, v)| *v)
            .unwrap();
        assert!((recall - 1.0 / 3.0).abs() < 1e-9);

        Ok(())
    }

    #[test]
    fn test_parity_difference_antisymmetry() -> Result<()> {
        let attrs = attributes();
        let evaluator = FairnessEvaluator::new(eval_config(), &attrs);
        let model = scored_model();

        let report = evaluator.evaluate(
            &model,
            &train_store(),
            &test_store(),
            None,
            None,
            EvalSetting::Remain,
            0,
        )?;

        // Swap the two group labels and re-evaluate.
        let mut swapped = AttributeTable::new(vec![AttrDimension::binary("gender")]);
        swapped.insert(0, vec![1]);
        swapped.insert(1, vec![0]);
        swapped.insert(2, vec![1]);
        swapped.insert(3, vec![0]);
        let evaluator_swapped = FairnessEvaluator::new(eval_config(), &swapped);
        let report_swapped = evaluator_swapped.evaluate(
            &model,
            &train_store(),
            &test_store(),
            None,
            None,
            EvalSetting::Remain,
            0,
        )?;

        let parity = report.dims[0].parity.as_ref().unwrap();
        let parity_swapped = report_swapped.dims[0].parity.as_ref().unwrap();
        for ((metric, a), (_, b)) in parity.iter().zip(parity_swapped) {
            assert!(
                (a + b).abs() < 1e-9,
                "parity for {metric} not antisymmetric: {a} vs {b}"
            );
        }

        Ok(())
    }

    #[test]
    fn test_ordinal_dimension_has_no_parity() -> Result<()> {
        let mut attrs = AttributeTable::new(vec![AttrDimension::ordinal(
            "age_band",
            vec![0, 1, 2],
        )]);
        attrs.insert(0, vec![0]);
        attrs.insert(1, vec![1]);
        attrs.insert(2, vec![2]);
        attrs.insert(3, vec![0]);

        let evaluator = FairnessEvaluator::new(eval_config(), &attrs);
        let report = evaluator.evaluate(
            &scored_model(),
            &train_store(),
            &test_store(),
            None,
            None,
            EvalSetting::Remain,
            0,
        )?;

        assert!(report.dims[0].parity.is_none());
        assert_eq!(report.dims[0].groups.len(), 3);

        Ok(())
    }

    #[test]
    fn test_missing_attribute_is_counted() -> Result<()> {
        let mut attrs = AttributeTable::new(vec![AttrDimension::binary("gender")]);
        // User 0 is deliberately absent.
        attrs.insert(1, vec![1]);
        attrs.insert(2, vec![0]);
        attrs.insert(3, vec![1]);

        let evaluator = FairnessEvaluator::new(eval_config(), &attrs);
        let report = evaluator.evaluate(
            &scored_model(),
            &train_store(),
            &test_store(),
            None,
            None,
            EvalSetting::Remain,
            0,
        )?;

        assert_eq!(report.anomalies.missing_attribute, 1);
        // Still contributes to the overall accumulator.
        assert_eq!(report.num_eval_users, 3);

        Ok(())
    }

    #[test]
    fn test_cold_start_counts_via_set_difference() -> Result<()> {
        let attrs = attributes();
        let evaluator = FairnessEvaluator::new(eval_config(), &attrs);

        // Users 0 and 1 are historical, users 2 and 3 are new this period.
        let hist = EdgeListStore::from_edges(vec![
            Interaction::new(0, 10),
            Interaction::new(1, 11),
        ]);

        let report = evaluator.evaluate(
            &scored_model(),
            &train_store(),
            &test_store(),
            Some(&hist),
            None,
            EvalSetting::Remain,
            1,
        )?;

        let groups = &report.dims[0].groups;
        // Group 0 holds users {0, 2}; only user 2 is cold.
        assert_eq!(groups[0].cold_start_users, 1);
        // Group 1 holds users {1, 3}; only user 3 is cold.
        assert_eq!(groups[1].cold_start_users, 1);
        assert_eq!(groups[0].train_users, 2);

        Ok(())
    }

    #[test]
    fn test_evaluation_is_idempotent() -> Result<()> {
        let attrs = attributes();
        let config = EvalConfig {
            rec_list: RecListConfig {
                top_k: 2,
                num_negatives: Some(1),
            },
            ..eval_config()
        };
        let evaluator = FairnessEvaluator::new(config, &attrs);
        let model = scored_model();

        let run = || {
            evaluator.evaluate(
                &model,
                &train_store(),
                &test_store(),
                None,
                None,
                EvalSetting::Remain,
                0,
            )
        };

        let a = run()?;
        let b = run()?;
        for ((m1, v1), (m2, v2)) in a.overall.iter().zip(&b.overall) {
            assert_eq!(m1, m2);
            assert_eq!(v1.to_bits(), v2.to_bits(), "metric {m1} not reproducible");
        }

        Ok(())
    }

    #[test]
    fn test_setting_file_resolution() {
        let dir = Path::new("/snap");

        let remain = resolve_setting_files(dir, EvalSetting::Remain, 2);
        assert_eq!(remain.train, dir.join("remain_train_snap2"));
        assert_eq!(remain.test, dir.join("remain_test_snap2"));
        assert_eq!(remain.hist_train, dir.join("remain_train_snap1"));
        assert_eq!(remain.incoming, dir.join("next_test_snap1"));

        // The irregular pairing: current tests on the previous period's
        // next file, and on its own train file at snapshot 0.
        let current0 = resolve_setting_files(dir, EvalSetting::Current, 0);
        assert_eq!(current0.train, dir.join("remain_train_snap0"));
        assert_eq!(current0.test, dir.join("remain_train_snap0"));

        let current2 = resolve_setting_files(dir, EvalSetting::Current, 2);
        assert_eq!(current2.train, dir.join("remain_train_snap2"));
        assert_eq!(current2.test, dir.join("next_test_snap1"));
    }
}
