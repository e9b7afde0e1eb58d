//! Tab-separated result files
//!
//! One file per (top-K, setting, snapshot) with `name<TAB>value` lines,
//! plus cross-snapshot mean and trend summaries and the scheduler's phase
//! time log.

use crate::evaluator::EvalReport;
use anyhow::{Context, Result};
use std::path::Path;

/// One reportable line; counts print as integers, metrics as 4-decimal
/// floats.
#[derive(Clone, Debug)]
pub struct ReportLine {
    pub name: String,
    pub value: f64,
    pub count: bool,
}

impl ReportLine {
    fn metric(name: String, value: f64) -> Self {
        Self {
            name,
            value,
            count: false,
        }
    }

    fn count(name: String, value: usize) -> Self {
        Self {
            name,
            value: value as f64,
            count: true,
        }
    }

    fn format_value(&self) -> String {
        if self.count {
            format!("{}", self.value as i64)
        } else {
            format!("{:.4}", self.value)
        }
    }
}

/// Flatten one evaluation report into its result-file lines.
pub fn report_lines(report: &EvalReport) -> Vec<ReportLine> {
    let mut lines = Vec::new();

    for dim in &report.dims {
        for (idx, (metric, value)) in report.overall.iter().enumerate() {
            lines.push(ReportLine::metric(format!("{metric}__overall"), *value));

            if let Some(parity) = &dim.parity {
                lines.push(ReportLine::metric(
                    format!("{metric}__{}", dim.name),
                    parity[idx].1,
                ));
            }
            for group in &dim.groups {
                lines.push(ReportLine::metric(
                    format!("{metric}__{}", group.group),
                    group.means[idx].1,
                ));
            }
        }
    }

    // Population diagnostics for the first dimension, as in the original
    // result files.
    if let Some(dim) = report.dims.first() {
        for group in &dim.groups {
            lines.push(ReportLine::count(
                format!("#_users_{}", group.group),
                group.train_users,
            ));
        }
        for group in &dim.groups {
            lines.push(ReportLine::count(
                format!("#_coldstart_users_{}", group.group),
                group.cold_start_users,
            ));
        }
        for group in &dim.groups {
            lines.push(ReportLine::count(
                format!("#_new_users_{}", group.group),
                group.new_users,
            ));
        }
        for group in &dim.groups {
            lines.push(ReportLine::count(
                format!("#_(valid)_test_users_{}", group.group),
                group.valid_users,
            ));
        }
        for group in &dim.groups {
            lines.push(ReportLine::metric(
                format!("#_(valid)_test_pos_mean_{}", group.group),
                group.test_pos_mean,
            ));
            lines.push(ReportLine::count(
                format!("#_(valid)_test_pos_total_{}", group.group),
                group.test_pos_total,
            ));
        }
        for group in &dim.groups {
            lines.push(ReportLine::metric(
                format!("#_(valid)_train_pos_mean_{}", group.group),
                group.train_pos_mean,
            ));
            lines.push(ReportLine::count(
                format!("#_(valid)_train_pos_total_{}", group.group),
                group.train_pos_total,
            ));
        }
        for group in &dim.groups {
            lines.push(ReportLine::metric(
                format!("#_unseen_mean_{}", group.group),
                group.unseen_mean,
            ));
            lines.push(ReportLine::count(
                format!("#_unseen_total_{}", group.group),
                group.unseen_total,
            ));
        }
    }

    lines.push(ReportLine::count(
        "#_overall_num_test_users".to_string(),
        report.num_train_users,
    ));
    lines.push(ReportLine::count(
        "#_overall_(valid)_test_users".to_string(),
        report.num_eval_users,
    ));
    lines.push(ReportLine::count(
        "#_missing_test_pos".to_string(),
        report.anomalies.missing_test_pos,
    ));
    lines.push(ReportLine::count(
        "#_missing_attr".to_string(),
        report.anomalies.missing_attribute,
    ));

    lines
}

/// Write one snapshot's result file.
pub fn write_snapshot_report(path: &Path, report: &EvalReport) -> Result<()> {
    let mut out = format!("Top {} results\n", report.top_k);
    for line in report_lines(report) {
        out.push_str(&format!("{}\t{}\n", line.name, line.format_value()));
    }
    std::fs::write(path, out)
        .with_context(|| format!("Failed to write result file {}", path.display()))
}

/// Write mean values over all snapshots of one setting.
pub fn write_mean_summary(path: &Path, reports: &[EvalReport]) -> Result<()> {
    let per_report: Vec<Vec<ReportLine>> = reports.iter().map(report_lines).collect();
    let mut out = String::new();

    if let Some(first) = per_report.first() {
        for (idx, line) in first.iter().enumerate() {
            let sum: f64 = per_report.iter().map(|lines| lines[idx].value).sum();
            out.push_str(&format!("{}\t{:.4}\n", line.name, sum / per_report.len() as f64));
        }
    }

    std::fs::write(path, out)
        .with_context(|| format!("Failed to write mean summary {}", path.display()))
}

/// Write the per-snapshot trend of every line of one setting.
pub fn write_trend_summary(path: &Path, reports: &[EvalReport]) -> Result<()> {
    let per_report: Vec<Vec<ReportLine>> = reports.iter().map(report_lines).collect();
    let mut out = String::new();

    if let Some(first) = per_report.first() {
        for (idx, line) in first.iter().enumerate() {
            out.push_str(&line.name);
            for lines in &per_report {
                out.push('\t');
                out.push_str(&lines[idx].format_value());
            }
            out.push('\n');
        }
    }

    std::fs::write(path, out)
        .with_context(|| format!("Failed to write trend summary {}", path.display()))
}

/// Write the scheduler's phase time log: names, seconds, minutes rows.
pub fn write_time_log(path: &Path, entries: &[(String, f64)]) -> Result<()> {
    let mut out = String::new();
    for (name, _) in entries {
        out.push_str(&format!("{name}\t"));
    }
    out.push('\n');
    for (_, secs) in entries {
        out.push_str(&format!("{secs:.4}\t"));
    }
    out.push('\n');
    for (_, secs) in entries {
        out.push_str(&format!("{:.4}\t", secs / 60.0));
    }
    out.push('\n');

    std::fs::write(path, out)
        .with_context(|| format!("Failed to write time log {}", path.display()))
}
