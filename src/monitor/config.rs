//! Configuration for the health monitor.

use super::alerts::Thresholds;
use crate::config::humantime_serde;
use crate::error::{HavocError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Base URL of the target service
    pub probe_url: String,
    /// Interval between samples
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
    /// Upper bound on one health probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Snapshots kept before the oldest is evicted
    pub history_capacity: usize,
    /// Consecutive good samples needed to return to healthy
    pub recovery_samples: u32,
    pub thresholds: Thresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_url: "http://localhost:8080".to_string(),
            sample_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            history_capacity: 100,
            recovery_samples: 3,
            thresholds: Thresholds::default(),
        }
    }
}

impl MonitorConfig {
    /// Short cadences for local runs and tests
    pub fn development() -> Self {
        Self {
            sample_interval: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_interval.is_zero() {
            return Err(HavocError::InvalidConfig {
                field: "monitor.sample_interval".to_string(),
                reason: "Sample interval must be positive".to_string(),
            });
        }

        if self.probe_timeout.is_zero() {
            return Err(HavocError::InvalidConfig {
                field: "monitor.probe_timeout".to_string(),
                reason: "Probe timeout must be positive".to_string(),
            });
        }

        if self.history_capacity == 0 {
            return Err(HavocError::InvalidConfig {
                field: "monitor.history_capacity".to_string(),
                reason: "History must hold at least one snapshot".to_string(),
            });
        }

        if self.recovery_samples == 0 {
            return Err(HavocError::InvalidConfig {
                field: "monitor.recovery_samples".to_string(),
                reason: "Recovery needs at least one good sample".to_string(),
            });
        }

        self.thresholds.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_config_default() {
        let config = MonitorConfig::default();
        assert_eq!(config.sample_interval, Duration::from_secs(10));
        assert_eq!(config.recovery_samples, 3);
        assert!(config.validate().is_ok());
        assert!(MonitorConfig::development().validate().is_ok());
    }

    #[test]
    fn test_monitor_config_from_json() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"sample_interval": "500ms", "thresholds": {"cpu_warn": 70}}"#)
                .unwrap();
        assert_eq!(config.sample_interval, Duration::from_millis(500));
        assert_eq!(config.thresholds.cpu_warn, 70.0);
        assert_eq!(config.thresholds.cpu_crit, 90.0);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_monitor_config_rejects_zero_capacity() {
        let config = MonitorConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
