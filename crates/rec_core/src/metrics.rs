//! Top-K ranking metrics
//!
//! Each metric scores one ranked recommendation list against the user's
//! test-positive set. Hits are binary relevance; ideal orderings for NDCG
//! place all hits first. Two NDCG and MRR conventions plus three average
//! precision normalizations are supported.

use crate::errors::{RecCoreError, Result};
use crate::types::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Supported per-user ranking metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    /// Number of recommended items that are true positives.
    Hit,
    Recall,
    Precision,
    F1,
    /// 1 if any recommended item is a true positive, else 0.
    HitRatio,
    /// NDCG, first position weighted 1, later positions 1/log2(rank+1).
    Ndcg0,
    /// NDCG, every position weighted 1/log2(rank+1) from rank 1.
    Ndcg1,
    /// Reciprocal ranks summed over all hits.
    Mrr0,
    /// Reciprocal rank of the first hit only.
    Mrr1,
    /// Mean of precision@k over hit positions.
    Ap0,
    /// Precision@k sum normalized by min(list length, #positives).
    Ap1,
    /// Precision@k sum normalized by #positives.
    Ap2,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::Hit,
        Metric::Recall,
        Metric::Precision,
        Metric::F1,
        Metric::HitRatio,
        Metric::Ndcg0,
        Metric::Ndcg1,
        Metric::Mrr0,
        Metric::Mrr1,
        Metric::Ap0,
        Metric::Ap1,
        Metric::Ap2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Hit => "hit",
            Metric::Recall => "recall",
            Metric::Precision => "precision",
            Metric::F1 => "f1",
            Metric::HitRatio => "hit_ratio",
            Metric::Ndcg0 => "ndcg0",
            Metric::Ndcg1 => "ndcg1",
            Metric::Mrr0 => "mrr0",
            Metric::Mrr1 => "mrr1",
            Metric::Ap0 => "ap0",
            Metric::Ap1 => "ap1",
            Metric::Ap2 => "ap2",
        }
    }

    /// Parse a comma-separated metric list, failing fast on any unknown
    /// entry before a single user is scored.
    pub fn parse_list(list: &str) -> Result<Vec<Metric>> {
        let mut metrics = Vec::new();
        for entry in list.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            metrics.push(entry.parse::<Metric>()?);
        }
        if metrics.is_empty() {
            return Err(RecCoreError::Config("empty metric list".to_string()));
        }
        Ok(metrics)
    }

    /// Score one recommendation list against the user's test positives.
    pub fn measure(&self, rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>) -> f64 {
        match self {
            Metric::Hit => hit_count(rec_list, test_pos) as f64,
            Metric::Recall => recall(rec_list, test_pos),
            Metric::Precision => precision(rec_list, test_pos),
            Metric::F1 => f1(rec_list, test_pos),
            Metric::HitRatio => {
                if hit_count(rec_list, test_pos) > 0 {
                    1.0
                } else {
                    0.0
                }
            }
            Metric::Ndcg0 => ndcg(rec_list, test_pos, NdcgMethod::HeadWeighted),
            Metric::Ndcg1 => ndcg(rec_list, test_pos, NdcgMethod::LogFromFirst),
            Metric::Mrr0 => mrr_all_hits(rec_list, test_pos),
            Metric::Mrr1 => mrr_first_hit(rec_list, test_pos),
            Metric::Ap0 => average_precision(rec_list, test_pos, ApNorm::HitCount),
            Metric::Ap1 => average_precision(rec_list, test_pos, ApNorm::MinLen),
            Metric::Ap2 => average_precision(rec_list, test_pos, ApNorm::PosCount),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = RecCoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hit" => Ok(Metric::Hit),
            "recall" => Ok(Metric::Recall),
            "precision" => Ok(Metric::Precision),
            "f1" => Ok(Metric::F1),
            "hit_ratio" => Ok(Metric::HitRatio),
            "ndcg0" => Ok(Metric::Ndcg0),
            "ndcg1" => Ok(Metric::Ndcg1),
            "mrr0" => Ok(Metric::Mrr0),
            "mrr1" => Ok(Metric::Mrr1),
            "ap0" => Ok(Metric::Ap0),
            "ap1" => Ok(Metric::Ap1),
            "ap2" => Ok(Metric::Ap2),
            other => Err(RecCoreError::Config(format!(
                "undefined evaluation metric: {other}"
            ))),
        }
    }
}

fn hits(rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>) -> Vec<bool> {
    rec_list.iter().map(|item| test_pos.contains(item)).collect()
}

fn hit_count(rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>) -> usize {
    rec_list.iter().filter(|item| test_pos.contains(item)).count()
}

fn recall(rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>) -> f64 {
    if test_pos.is_empty() {
        return 0.0;
    }
    hit_count(rec_list, test_pos) as f64 / test_pos.len() as f64
}

fn precision(rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>) -> f64 {
    if rec_list.is_empty() {
        return 0.0;
    }
    hit_count(rec_list, test_pos) as f64 / rec_list.len() as f64
}

fn f1(rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>) -> f64 {
    let r = recall(rec_list, test_pos);
    let p = precision(rec_list, test_pos);
    if r + p == 0.0 {
        0.0
    } else {
        2.0 * r * p / (r + p)
    }
}

#[derive(Clone, Copy)]
enum NdcgMethod {
    /// Rank 1 weighted 1, rank k >= 2 weighted 1/log2(k+1).
    HeadWeighted,
    /// Rank k >= 1 weighted 1/log2(k+1).
    LogFromFirst,
}

fn dcg(relevance: &[bool], method: NdcgMethod) -> f64 {
    match method {
        NdcgMethod::HeadWeighted => {
            let head = if relevance.first().copied().unwrap_or(false) {
                1.0
            } else {
                0.0
            };
            head + relevance
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, hit)| **hit)
                .map(|(idx, _)| 1.0 / ((idx + 1) as f64).log2())
                .sum::<f64>()
        }
        NdcgMethod::LogFromFirst => relevance
            .iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(idx, _)| 1.0 / ((idx + 2) as f64).log2())
            .sum(),
    }
}

fn ndcg(rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>, method: NdcgMethod) -> f64 {
    let r = hits(rec_list, test_pos);

    // Ideal ordering: all hits first.
    let mut ideal = r.clone();
    ideal.sort_by(|a, b| b.cmp(a));

    let idcg = dcg(&ideal, method);
    if idcg == 0.0 {
        return 0.0;
    }
    dcg(&r, method) / idcg
}

fn mrr_all_hits(rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>) -> f64 {
    hits(rec_list, test_pos)
        .iter()
        .enumerate()
        .filter(|(_, hit)| **hit)
        .map(|(idx, _)| 1.0 / (idx + 1) as f64)
        .sum()
}

fn mrr_first_hit(rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>) -> f64 {
    match hits(rec_list, test_pos).iter().position(|hit| *hit) {
        Some(idx) => 1.0 / (idx + 1) as f64,
        None => 0.0,
    }
}

#[derive(Clone, Copy)]
enum ApNorm {
    HitCount,
    MinLen,
    PosCount,
}

fn average_precision(rec_list: &[ItemId], test_pos: &BTreeSet<ItemId>, norm: ApNorm) -> f64 {
    let r = hits(rec_list, test_pos);
    let precisions: Vec<f64> = r
        .iter()
        .enumerate()
        .filter(|(_, hit)| **hit)
        .map(|(k, _)| precision(&rec_list[..=k], test_pos))
        .collect();

    if precisions.is_empty() {
        return 0.0;
    }

    let sum: f64 = precisions.iter().sum();
    match norm {
        ApNorm::HitCount => sum / precisions.len() as f64,
        ApNorm::MinLen => sum / rec_list.len().min(test_pos.len()) as f64,
        ApNorm::PosCount => sum / test_pos.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(items: &[ItemId]) -> BTreeSet<ItemId> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_unknown_metric_is_config_error() {
        let result = "bogus".parse::<Metric>();
        assert!(matches!(result, Err(RecCoreError::Config(_))));

        assert!(Metric::parse_list("recall,bogus,ndcg1").is_err());
    }

    #[test]
    fn test_parse_list() -> Result<()> {
        let metrics = Metric::parse_list("recall, ndcg1 ,ap0")?;
        assert_eq!(metrics, vec![Metric::Recall, Metric::Ndcg1, Metric::Ap0]);
        Ok(())
    }

    #[test]
    fn test_hit_based_metrics() {
        // rec list [a(hit), b, c(hit)] against {a, c}
        let rec = vec![1, 2, 3];
        let test = pos(&[1, 3]);

        assert_eq!(Metric::Hit.measure(&rec, &test), 2.0);
        assert!((Metric::Recall.measure(&rec, &test) - 1.0).abs() < 1e-12);
        assert!((Metric::Precision.measure(&rec, &test) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(Metric::HitRatio.measure(&rec, &test), 1.0);
    }

    #[test]
    fn test_f1_zero_iff_no_overlap() {
        let rec = vec![1, 2, 3];
        assert_eq!(Metric::F1.measure(&rec, &pos(&[9])), 0.0);

        let r = Metric::Recall.measure(&rec, &pos(&[1, 9]));
        let p = Metric::Precision.measure(&rec, &pos(&[1, 9]));
        let f = Metric::F1.measure(&rec, &pos(&[1, 9]));
        assert!((f - 2.0 * r * p / (r + p)).abs() < 1e-12);
    }

    #[test]
    fn test_ndcg1_bounds_and_perfect_ranking() {
        let test = pos(&[1, 2]);

        // All positives at the head, in any order, score exactly 1.
        assert!((Metric::Ndcg1.measure(&[2, 1, 5, 6], &test) - 1.0).abs() < 1e-12);
        assert!((Metric::Ndcg1.measure(&[1, 2, 5, 6], &test) - 1.0).abs() < 1e-12);

        let v = Metric::Ndcg1.measure(&[5, 1, 6, 2], &test);
        assert!(v > 0.0 && v < 1.0);

        assert_eq!(Metric::Ndcg1.measure(&[5, 6], &test), 0.0);
    }

    #[test]
    fn test_ndcg0_head_weighting() {
        let test = pos(&[1]);

        // Hit at rank 1: dcg = 1, idcg = 1.
        assert!((Metric::Ndcg0.measure(&[1, 5, 6], &test) - 1.0).abs() < 1e-12);

        // Hit at rank 3: dcg = 1/log2(3), idcg = 1.
        let expected = 1.0 / 3f64.log2();
        assert!((Metric::Ndcg0.measure(&[5, 6, 1], &test) - expected).abs() < 1e-12);

        // Ranks 1 and 2 carry equal weight under this convention.
        let two = pos(&[1, 2]);
        assert!((Metric::Ndcg0.measure(&[1, 2], &two) - 1.0).abs() < 1e-12);
        assert!((Metric::Ndcg0.measure(&[2, 1], &two) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mrr_conventions() {
        let test = pos(&[1, 3]);
        let rec = vec![5, 1, 3, 6];

        // Method 0 sums reciprocal ranks of all hits: 1/2 + 1/3.
        assert!((Metric::Mrr0.measure(&rec, &test) - (0.5 + 1.0 / 3.0)).abs() < 1e-12);
        // Method 1 keeps only the first hit.
        assert!((Metric::Mrr1.measure(&rec, &test) - 0.5).abs() < 1e-12);
        assert_eq!(Metric::Mrr1.measure(&[5, 6], &test), 0.0);
    }

    #[test]
    fn test_average_precision_normalizations() {
        let test = pos(&[1, 3]);
        let rec = vec![1, 5, 3];
        // Hits at ranks 1 and 3; precision@1 = 1, precision@3 = 2/3.
        let sum = 1.0 + 2.0 / 3.0;

        assert!((Metric::Ap0.measure(&rec, &test) - sum / 2.0).abs() < 1e-12);
        assert!((Metric::Ap1.measure(&rec, &test) - sum / 2.0).abs() < 1e-12);
        assert!((Metric::Ap2.measure(&rec, &test) - sum / 2.0).abs() < 1e-12);

        // No hits: all conventions return 0.
        assert_eq!(Metric::Ap0.measure(&[5, 6], &test), 0.0);
    }

    #[test]
    fn test_ap_norms_differ_when_list_shorter_than_positives() {
        let test = pos(&[1, 2, 3, 4]);
        let rec = vec![1, 2];
        // precision@1 = 1, precision@2 = 1; sum = 2, hits = 2.
        assert!((Metric::Ap0.measure(&rec, &test) - 1.0).abs() < 1e-12);
        assert!((Metric::Ap1.measure(&rec, &test) - 1.0).abs() < 1e-12);
        assert!((Metric::Ap2.measure(&rec, &test) - 0.5).abs() < 1e-12);
    }
}
