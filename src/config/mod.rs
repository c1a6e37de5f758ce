//! Configuration module for havoc.

use crate::chaos::{sample_definitions, ExperimentDefinition, OrchestratorConfig};
use crate::error::{HavocError, Result};
use crate::monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

/// Main configuration for a havoc session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HavocConfig {
    /// Chaos orchestrator configuration.
    pub orchestrator: OrchestratorConfig,
    /// Health monitor configuration.
    pub monitor: MonitorConfig,
    /// Experiment catalog.
    pub experiments: Vec<ExperimentDefinition>,
    /// Observability configuration.
    pub observability: ObservabilityConfig,
}

impl HavocConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HavocError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| HavocError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate()?;
        self.monitor.validate()?;

        let mut names = HashSet::new();
        for (i, definition) in self.experiments.iter().enumerate() {
            definition.validate().map_err(|e| HavocError::InvalidConfig {
                field: format!("experiments[{}]", i),
                reason: e.to_string(),
            })?;
            if !names.insert(definition.name.as_str()) {
                return Err(HavocError::InvalidConfig {
                    field: format!("experiments[{}].name", i),
                    reason: format!("Duplicate experiment name '{}'", definition.name),
                });
            }
        }

        Ok(())
    }

    /// Create a development configuration with the sample catalog.
    pub fn development() -> Self {
        Self {
            orchestrator: OrchestratorConfig::development(),
            monitor: MonitorConfig::development(),
            experiments: sample_definitions(),
            observability: ObservabilityConfig {
                metrics_enabled: false,
                ..Default::default()
            },
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics.
    pub metrics_enabled: bool,
    /// Metrics bind address.
    pub metrics_addr: SocketAddr,
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
///
/// Accepts `"250ms"`, `"2s"`, `"1m"`, or a bare integer as milliseconds.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<f64>()
                .map_err(|e| e.to_string())
                .and_then(|v| {
                    Duration::try_from_secs_f64(v).map_err(|e| e.to_string())
                })
        } else if let Some(m) = s.strip_suffix('m') {
            m.trim()
                .parse::<u64>()
                .map(|v| Duration::from_secs(v.saturating_mul(60)))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}
