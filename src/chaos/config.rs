//! Configuration for the chaos orchestrator.

use super::signal::MAX_POLL_INTERVAL;
use crate::config::humantime_serde;
use crate::error::{HavocError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Chaos orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Interval between scheduling ticks
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// How long `stop()` waits for runs to drain before forcing them
    #[serde(with = "humantime_serde")]
    pub stop_grace_period: Duration,
    /// Allowed overrun past a run's deadline before it is force-aborted
    #[serde(with = "humantime_serde")]
    pub deadline_slack: Duration,
    /// How long a finished or aborted run may take to release what it left
    /// behind before its outcome is recorded anyway
    #[serde(with = "humantime_serde")]
    pub cleanup_timeout: Duration,
    /// How often executors check their stop signal (at most 1s)
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Seed for trigger draws; drawn from the OS and logged when absent
    pub seed: Option<u64>,
    /// Directory for disk filler files; the system temp dir when absent
    pub scratch_dir: Option<PathBuf>,
    /// Upper bound on memory ballast as a fraction of available memory
    pub memory_ceiling_fraction: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(20),
            stop_grace_period: Duration::from_secs(10),
            deadline_slack: Duration::from_millis(500),
            cleanup_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            seed: None,
            scratch_dir: None,
            memory_ceiling_fraction: 0.5,
        }
    }
}

impl OrchestratorConfig {
    /// Short cadences for local runs and tests
    pub fn development() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            stop_grace_period: Duration::from_secs(3),
            deadline_slack: Duration::from_millis(500),
            cleanup_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            seed: None,
            scratch_dir: None,
            memory_ceiling_fraction: 0.25,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(HavocError::InvalidConfig {
                field: "orchestrator.tick_interval".to_string(),
                reason: "Tick interval must be positive".to_string(),
            });
        }

        if self.cleanup_timeout.is_zero() {
            return Err(HavocError::InvalidConfig {
                field: "orchestrator.cleanup_timeout".to_string(),
                reason: "Cleanup timeout must be positive".to_string(),
            });
        }

        if self.poll_interval.is_zero() || self.poll_interval > MAX_POLL_INTERVAL {
            return Err(HavocError::InvalidConfig {
                field: "orchestrator.poll_interval".to_string(),
                reason: "Poll interval must be between 1ms and 1s".to_string(),
            });
        }

        if !(self.memory_ceiling_fraction > 0.0 && self.memory_ceiling_fraction <= 1.0) {
            return Err(HavocError::InvalidConfig {
                field: "orchestrator.memory_ceiling_fraction".to_string(),
                reason: "Memory ceiling must be in (0, 1]".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(20));
        assert_eq!(config.deadline_slack, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_development() {
        let config = OrchestratorConfig::development();
        assert!(config.tick_interval < OrchestratorConfig::default().tick_interval);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_interval_bound() {
        let config = OrchestratorConfig {
            poll_interval: Duration::from_secs(2),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cleanup_timeout_required() {
        let config = OrchestratorConfig {
            cleanup_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{ "tick_interval": "1s", "seed": 7 }"#).unwrap();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.stop_grace_period, Duration::from_secs(10));
    }
}
