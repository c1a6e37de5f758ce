//! Threshold configuration and alert derivation.

use super::snapshot::{AlertEvent, AlertSeverity, AppStatus, HealthSnapshot};
use crate::error::{HavocError, Result};
use serde::{Deserialize, Serialize};

/// Alert thresholds. A value strictly above a threshold crosses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cpu_warn: f64,
    pub cpu_crit: f64,
    pub mem_warn: f64,
    pub mem_crit: f64,
    pub disk_warn: f64,
    pub disk_crit: f64,
    /// 1-minute load per core
    pub load_warn_per_core: f64,
    pub load_crit_per_core: f64,
    pub response_warn_ms: f64,
    pub response_crit_ms: f64,
    pub error_rate_warn_pct: f64,
    pub error_rate_crit_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_warn: 80.0,
            cpu_crit: 90.0,
            mem_warn: 80.0,
            mem_crit: 90.0,
            disk_warn: 85.0,
            disk_crit: 95.0,
            load_warn_per_core: 1.0,
            load_crit_per_core: 2.0,
            response_warn_ms: 1000.0,
            response_crit_ms: 2000.0,
            error_rate_warn_pct: 5.0,
            error_rate_crit_pct: 10.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let pairs = [
            ("cpu", self.cpu_warn, self.cpu_crit),
            ("mem", self.mem_warn, self.mem_crit),
            ("disk", self.disk_warn, self.disk_crit),
            ("load", self.load_warn_per_core, self.load_crit_per_core),
            ("response", self.response_warn_ms, self.response_crit_ms),
            ("error_rate", self.error_rate_warn_pct, self.error_rate_crit_pct),
        ];

        for (metric, warn, crit) in pairs {
            if !(warn >= 0.0 && warn <= crit) {
                return Err(HavocError::InvalidConfig {
                    field: format!("monitor.thresholds.{}", metric),
                    reason: format!("warning {} must be non-negative and at most critical {}", warn, crit),
                });
            }
        }
        Ok(())
    }

    /// Whether the target's response metrics are above their warning level.
    pub fn response_degraded(&self, response_time_ms: Option<f64>, error_rate_pct: Option<f64>) -> bool {
        response_time_ms.is_some_and(|ms| ms > self.response_warn_ms)
            || error_rate_pct.is_some_and(|pct| pct > self.error_rate_warn_pct)
    }
}

fn classify(
    metric: &str,
    label: &str,
    unit: &str,
    observed: f64,
    warn: f64,
    crit: f64,
) -> Option<AlertEvent> {
    let (severity, threshold) = if observed > crit {
        (AlertSeverity::Critical, crit)
    } else if observed > warn {
        (AlertSeverity::Warning, warn)
    } else {
        return None;
    };

    let prefix = match severity {
        AlertSeverity::Critical => "Critical",
        AlertSeverity::Warning => "High",
    };
    Some(AlertEvent {
        severity,
        metric: metric.to_string(),
        observed_value: observed,
        threshold,
        message: format!("{} {}: {:.1}{}", prefix, label, observed, unit),
    })
}

/// Alerts raised by `snapshot`, at most one per metric at its highest
/// severity.
///
/// Order: cpu, memory, disk, load, app status, response time, error rate.
/// An unreachable target yields a single critical `app_status` alert and no
/// response alerts.
pub fn alerts_for(snapshot: &HealthSnapshot, thresholds: &Thresholds) -> Vec<AlertEvent> {
    let mut alerts = Vec::new();

    alerts.extend(classify(
        "cpu_pct",
        "CPU usage",
        "%",
        snapshot.cpu_pct,
        thresholds.cpu_warn,
        thresholds.cpu_crit,
    ));
    alerts.extend(classify(
        "mem_pct",
        "memory usage",
        "%",
        snapshot.mem_pct,
        thresholds.mem_warn,
        thresholds.mem_crit,
    ));
    alerts.extend(classify(
        "disk_pct",
        "disk usage",
        "%",
        snapshot.disk_pct,
        thresholds.disk_warn,
        thresholds.disk_crit,
    ));

    if snapshot.cpu_count > 0 {
        let cores = snapshot.cpu_count as f64;
        alerts.extend(classify(
            "load_avg_1m",
            "load average",
            "",
            snapshot.load_avg[0],
            thresholds.load_warn_per_core * cores,
            thresholds.load_crit_per_core * cores,
        ));
    }

    match snapshot.app_status {
        AppStatus::Unreachable => {
            alerts.push(AlertEvent {
                severity: AlertSeverity::Critical,
                metric: "app_status".to_string(),
                observed_value: AppStatus::Unreachable.score(),
                threshold: AppStatus::Healthy.score(),
                message: "Application is unreachable".to_string(),
            });
            return alerts;
        }
        AppStatus::Degraded => alerts.push(AlertEvent {
            severity: AlertSeverity::Warning,
            metric: "app_status".to_string(),
            observed_value: AppStatus::Degraded.score(),
            threshold: AppStatus::Healthy.score(),
            message: "Application status is degraded".to_string(),
        }),
        AppStatus::Healthy => {}
    }

    if let Some(ms) = snapshot.response_time_ms {
        alerts.extend(classify(
            "response_time_ms",
            "response time",
            "ms",
            ms,
            thresholds.response_warn_ms,
            thresholds.response_crit_ms,
        ));
    }
    if let Some(pct) = snapshot.error_rate_pct {
        alerts.extend(classify(
            "error_rate_pct",
            "error rate",
            "%",
            pct,
            thresholds.error_rate_warn_pct,
            thresholds.error_rate_crit_pct,
        ));
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::snapshot::SystemMetrics;

    fn snapshot(cpu: f64, mem: f64, status: AppStatus) -> HealthSnapshot {
        let mut s = HealthSnapshot::new(
            SystemMetrics {
                cpu_pct: cpu,
                mem_pct: mem,
                disk_pct: 40.0,
                load_avg: [0.5, 0.5, 0.5],
                cpu_count: 4,
            },
            status,
        );
        if status != AppStatus::Unreachable {
            s.status_code = Some(200);
            s.response_time_ms = Some(20.0);
            s.error_rate_pct = Some(0.0);
        }
        s
    }

    #[test]
    fn test_quiet_snapshot_has_no_alerts() {
        let alerts = alerts_for(&snapshot(10.0, 20.0, AppStatus::Healthy), &Thresholds::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_only_highest_severity_per_metric() {
        let alerts = alerts_for(&snapshot(95.0, 85.0, AppStatus::Healthy), &Thresholds::default());
        assert_eq!(alerts.len(), 2);

        assert_eq!(alerts[0].metric, "cpu_pct");
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].threshold, 90.0);

        assert_eq!(alerts[1].metric, "mem_pct");
        assert_eq!(alerts[1].severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_threshold_is_strict() {
        let alerts = alerts_for(&snapshot(80.0, 20.0, AppStatus::Healthy), &Thresholds::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_unreachable_is_single_critical() {
        let alerts = alerts_for(&snapshot(10.0, 20.0, AppStatus::Unreachable), &Thresholds::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, "app_status");
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].observed_value, 0.0);
    }

    #[test]
    fn test_degraded_response_alerts() {
        let mut s = snapshot(10.0, 20.0, AppStatus::Degraded);
        s.response_time_ms = Some(2500.0);
        s.error_rate_pct = Some(7.5);

        let alerts = alerts_for(&s, &Thresholds::default());
        let metrics: Vec<_> = alerts.iter().map(|a| a.metric.as_str()).collect();
        assert_eq!(metrics, vec!["app_status", "response_time_ms", "error_rate_pct"]);
        assert_eq!(alerts[1].severity, AlertSeverity::Critical);
        assert_eq!(alerts[2].severity, AlertSeverity::Warning);
    }

    #[test]
    fn test_load_scales_with_cores() {
        let mut s = snapshot(10.0, 20.0, AppStatus::Healthy);
        s.load_avg = [9.0, 4.0, 2.0];
        let alerts = alerts_for(&s, &Thresholds::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, "load_avg_1m");
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].threshold, 8.0);
    }

    #[test]
    fn test_validate_rejects_inverted_pair() {
        let thresholds = Thresholds {
            cpu_warn: 95.0,
            cpu_crit: 90.0,
            ..Default::default()
        };
        assert!(thresholds.validate().is_err());
        assert!(Thresholds::default().validate().is_ok());
    }
}
