//! Health snapshots and alert events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application status as seen by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    /// Probe succeeded and metrics are under threshold.
    Healthy,
    /// Probe succeeded but response time or error rate is elevated.
    Degraded,
    /// Probe timed out or could not connect.
    Unreachable,
}

impl AppStatus {
    /// Numeric score: 1 healthy, 0.5 degraded, 0 unreachable.
    pub fn score(&self) -> f64 {
        match self {
            AppStatus::Healthy => 1.0,
            AppStatus::Degraded => 0.5,
            AppStatus::Unreachable => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Healthy => "healthy",
            AppStatus::Degraded => "degraded",
            AppStatus::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A threshold crossing derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub severity: AlertSeverity,
    /// Metric name, e.g. `cpu_pct` or `app_status`
    pub metric: String,
    pub observed_value: f64,
    pub threshold: f64,
    /// Human-readable summary
    pub message: String,
}

/// Host resource readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    /// 1, 5 and 15 minute load averages
    pub load_avg: [f64; 3],
    pub cpu_count: usize,
}

/// One monitoring sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    pub load_avg: [f64; 3],
    pub cpu_count: usize,
    pub app_status: AppStatus,
    /// HTTP status of the health call; absent when unreachable
    pub status_code: Option<u16>,
    /// Absent when unreachable
    pub response_time_ms: Option<f64>,
    /// Absent when unreachable or not reported by the target
    pub error_rate_pct: Option<f64>,
    /// Why the probe failed, when it did
    pub probe_error: Option<String>,
    pub alerts: Vec<AlertEvent>,
}

impl HealthSnapshot {
    /// Snapshot with the given readings and no alerts.
    pub fn new(system: SystemMetrics, app_status: AppStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu_pct: system.cpu_pct,
            mem_pct: system.mem_pct,
            disk_pct: system.disk_pct,
            load_avg: system.load_avg,
            cpu_count: system.cpu_count,
            app_status,
            status_code: None,
            response_time_ms: None,
            error_rate_pct: None,
            probe_error: None,
            alerts: Vec::new(),
        }
    }

    pub fn has_critical(&self) -> bool {
        self.alerts
            .iter()
            .any(|a| a.severity == AlertSeverity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&AppStatus::Unreachable).unwrap(),
            "\"unreachable\""
        );
        assert_eq!(AppStatus::Degraded.score(), 0.5);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::Warning);
    }
}
