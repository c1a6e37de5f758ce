//! Bounded snapshot history and export.

use super::snapshot::HealthSnapshot;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;

/// Serialization format for exported history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// A single JSON array
    Json,
    /// One JSON object per line
    JsonLines,
    /// Flat CSV without alert details
    Csv,
}

/// Append-only buffer that evicts the oldest snapshot at capacity.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<HealthSnapshot>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: HealthSnapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&HealthSnapshot> {
        self.snapshots.back()
    }

    /// Up to `n` most recent snapshots, oldest first.
    pub fn recent(&self, n: usize) -> Vec<HealthSnapshot> {
        let skip = self.snapshots.len().saturating_sub(n);
        self.snapshots.iter().skip(skip).cloned().collect()
    }

    /// Snapshots taken at or after `since`, oldest first.
    pub fn since(&self, since: DateTime<Utc>) -> Vec<HealthSnapshot> {
        self.snapshots
            .iter()
            .filter(|s| s.timestamp >= since)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<HealthSnapshot> {
        self.snapshots.iter().cloned().collect()
    }

    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&self.snapshots)?),
            ExportFormat::JsonLines => {
                let mut out = String::new();
                for snapshot in &self.snapshots {
                    out.push_str(&serde_json::to_string(snapshot)?);
                    out.push('\n');
                }
                Ok(out)
            }
            ExportFormat::Csv => Ok(self.to_csv()),
        }
    }

    fn to_csv(&self) -> String {
        fn opt(v: Option<f64>) -> String {
            v.map(|v| format!("{:.2}", v)).unwrap_or_default()
        }

        let mut out = String::from(
            "timestamp,cpu_pct,mem_pct,disk_pct,load_1m,load_5m,load_15m,app_status,status_code,response_time_ms,error_rate_pct,alerts\n",
        );
        for s in &self.snapshots {
            let _ = writeln!(
                out,
                "{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{},{},{},{},{}",
                s.timestamp.to_rfc3339(),
                s.cpu_pct,
                s.mem_pct,
                s.disk_pct,
                s.load_avg[0],
                s.load_avg[1],
                s.load_avg[2],
                s.app_status,
                s.status_code.map(|c| c.to_string()).unwrap_or_default(),
                opt(s.response_time_ms),
                opt(s.error_rate_pct),
                s.alerts.len(),
            );
        }
        out
    }
}
