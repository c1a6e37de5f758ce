//! Session summaries built from the experiment log and the health feed.

use crate::chaos::{ChaosType, ExperimentRun, RunOutcome};
use crate::monitor::{AlertSeverity, AppStatus, HealthSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Average, minimum and maximum of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

impl MetricSummary {
    /// `None` when `values` is empty.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut summary: Option<Self> = None;
        let mut total = 0.0;

        for value in values {
            total += value;
            summary = Some(match summary {
                None => Self {
                    avg: 0.0,
                    min: value,
                    max: value,
                    samples: 1,
                },
                Some(s) => Self {
                    avg: 0.0,
                    min: s.min.min(value),
                    max: s.max.max(value),
                    samples: s.samples + 1,
                },
            });
        }

        summary.map(|s| Self {
            avg: total / s.samples as f64,
            ..s
        })
    }
}

/// Counts of experiment outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub completed: usize,
    /// Completed runs that could not apply their full intensity
    pub with_shortfall: usize,
    pub aborted: usize,
    pub failed: usize,
}

/// Summary of one havoc session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub experiments_run: usize,
    pub outcomes: OutcomeCounts,
    pub runs_by_type: BTreeMap<ChaosType, usize>,
    pub samples: usize,
    pub alerts_by_severity: BTreeMap<AlertSeverity, usize>,
    /// Samples per application status over the whole feed
    pub status_counts: BTreeMap<String, usize>,
    /// Over the last `window` samples
    pub cpu: Option<MetricSummary>,
    pub memory: Option<MetricSummary>,
    pub response_time_ms: Option<MetricSummary>,
    pub window: usize,
    pub final_status: Option<AppStatus>,
}

impl RunReport {
    /// Summarize finished `runs` and the health feed, with resource
    /// statistics over the last `window` snapshots.
    pub fn build(runs: &[ExperimentRun], snapshots: &[HealthSnapshot], window: usize) -> Self {
        let mut outcomes = OutcomeCounts::default();
        let mut runs_by_type = BTreeMap::new();

        for run in runs {
            *runs_by_type.entry(run.chaos_type()).or_insert(0) += 1;
            match &run.outcome {
                Some(RunOutcome::Completed { shortfall }) => {
                    outcomes.completed += 1;
                    if shortfall.is_some() {
                        outcomes.with_shortfall += 1;
                    }
                }
                Some(RunOutcome::Aborted { .. }) => outcomes.aborted += 1,
                Some(RunOutcome::Failed { .. }) => outcomes.failed += 1,
                None => {}
            }
        }

        let mut alerts_by_severity = BTreeMap::new();
        let mut status_counts = BTreeMap::new();
        for snapshot in snapshots {
            *status_counts
                .entry(snapshot.app_status.as_str().to_string())
                .or_insert(0) += 1;
            for alert in &snapshot.alerts {
                *alerts_by_severity.entry(alert.severity).or_insert(0) += 1;
            }
        }

        let tail = &snapshots[snapshots.len().saturating_sub(window)..];

        Self {
            generated_at: Utc::now(),
            experiments_run: runs.len(),
            outcomes,
            runs_by_type,
            samples: snapshots.len(),
            alerts_by_severity,
            status_counts,
            cpu: MetricSummary::from_values(tail.iter().map(|s| s.cpu_pct)),
            memory: MetricSummary::from_values(tail.iter().map(|s| s.mem_pct)),
            response_time_ms: MetricSummary::from_values(
                tail.iter().filter_map(|s| s.response_time_ms),
            ),
            window: tail.len(),
            final_status: snapshots.last().map(|s| s.app_status),
        }
    }

    pub fn alert_count(&self, severity: AlertSeverity) -> usize {
        self.alerts_by_severity.get(&severity).copied().unwrap_or(0)
    }
}
