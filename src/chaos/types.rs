//! Core types for chaos experiments.

use crate::config::humantime_serde;
use crate::error::{HavocError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Chaos Types
// ============================================================================

/// Kinds of failure an experiment can inject.
///
/// Adding a kind means adding a variant here and a matching executor in
/// [`ExecutorSet`](super::executor::ExecutorSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChaosType {
    /// Saturate worker threads with busy computation
    CpuStress,
    /// Hold allocated memory blocks
    MemoryStress,
    /// Delay outbound calls to the target
    NetworkLatency,
    /// Suspend the target and bring it back later
    ServiceDisruption,
    /// Fill scratch space with temporary files
    DiskPressure,
    /// Freeze the target's processing path
    ProcessHang,
}

impl ChaosType {
    /// All variants, in declaration order.
    pub const ALL: [ChaosType; 6] = [
        ChaosType::CpuStress,
        ChaosType::MemoryStress,
        ChaosType::NetworkLatency,
        ChaosType::ServiceDisruption,
        ChaosType::DiskPressure,
        ChaosType::ProcessHang,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChaosType::CpuStress => "cpu_stress",
            ChaosType::MemoryStress => "memory_stress",
            ChaosType::NetworkLatency => "network_latency",
            ChaosType::ServiceDisruption => "service_disruption",
            ChaosType::DiskPressure => "disk_pressure",
            ChaosType::ProcessHang => "process_hang",
        }
    }
}

impl fmt::Display for ChaosType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// A single experiment parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

/// Named experiment parameters with typed accessors.
///
/// Accessors return `Ok(None)` when the key is absent and an
/// [`HavocError::InvalidParameter`] when it is present with the wrong shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Non-negative integer parameter.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(ParamValue::Int(v)) if *v >= 0 => Ok(Some(*v as u64)),
            Some(ParamValue::Float(v)) if *v >= 0.0 && v.fract() == 0.0 => Ok(Some(*v as u64)),
            Some(other) => Err(HavocError::invalid_parameter(
                key,
                format!("expected a non-negative integer, got {:?}", other),
            )),
        }
    }

    /// Floating point parameter; integers are widened.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(ParamValue::Float(v)) => Ok(Some(*v)),
            Some(ParamValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(HavocError::invalid_parameter(
                key,
                format!("expected a number, got {:?}", other),
            )),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(ParamValue::Text(v)) => Ok(Some(v.as_str())),
            Some(other) => Err(HavocError::invalid_parameter(
                key,
                format!("expected a string, got {:?}", other),
            )),
        }
    }

    pub fn get_path(&self, key: &str) -> Result<Option<PathBuf>> {
        Ok(self.get_str(key)?.map(PathBuf::from))
    }
}

// ============================================================================
// Experiment Definition
// ============================================================================

/// An immutable catalog entry describing one kind of experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    /// Unique name within a catalog
    pub name: String,
    /// Which executor runs it
    #[serde(rename = "type")]
    pub chaos_type: ChaosType,
    /// Upper bound on a single run
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Chance of triggering on each scheduling tick
    pub probability: f64,
    /// Executor-specific parameters
    #[serde(default)]
    pub parameters: Parameters,
}

impl ExperimentDefinition {
    pub fn builder() -> DefinitionBuilder {
        DefinitionBuilder::new()
    }

    /// Check the fields that do not depend on the executor.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HavocError::InvalidArgument(
                "Experiment name is required".into(),
            ));
        }

        if self.duration.is_zero() {
            return Err(HavocError::InvalidArgument(format!(
                "Experiment '{}' must have a positive duration",
                self.name
            )));
        }

        if !(0.0..=1.0).contains(&self.probability) {
            return Err(HavocError::InvalidArgument(format!(
                "Experiment '{}' probability {} is outside [0, 1]",
                self.name, self.probability
            )));
        }

        Ok(())
    }
}

/// Builder for experiment definitions
pub struct DefinitionBuilder {
    name: Option<String>,
    chaos_type: Option<ChaosType>,
    duration: Duration,
    probability: f64,
    parameters: Parameters,
}

impl DefinitionBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            chaos_type: None,
            duration: Duration::from_secs(10),
            probability: 0.0,
            parameters: Parameters::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn chaos_type(mut self, chaos_type: ChaosType) -> Self {
        self.chaos_type = Some(chaos_type);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key, value);
        self
    }

    pub fn build(self) -> Result<ExperimentDefinition> {
        let name = self
            .name
            .ok_or_else(|| HavocError::InvalidArgument("Experiment name is required".into()))?;
        let chaos_type = self.chaos_type.ok_or_else(|| {
            HavocError::InvalidArgument(format!("Experiment '{}' has no chaos type", name))
        })?;

        let definition = ExperimentDefinition {
            name,
            chaos_type,
            duration: self.duration,
            probability: self.probability,
            parameters: self.parameters,
        };
        definition.validate()?;
        Ok(definition)
    }
}

impl Default for DefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chaos_type_serde_names() {
        let json = serde_json::to_string(&ChaosType::ServiceDisruption).unwrap();
        assert_eq!(json, "\"SERVICE_DISRUPTION\"");

        let parsed: ChaosType = serde_json::from_str("\"DISK_PRESSURE\"").unwrap();
        assert_eq!(parsed, ChaosType::DiskPressure);
    }

    #[test]
    fn test_parameter_accessors() {
        let params = Parameters::new()
            .with("cores", 4i64)
            .with("restart_after_s", 1.5)
            .with("path", "/tmp/havoc");

        assert_eq!(params.get_u64("cores").unwrap(), Some(4));
        assert_eq!(params.get_f64("cores").unwrap(), Some(4.0));
        assert_eq!(params.get_f64("restart_after_s").unwrap(), Some(1.5));
        assert_eq!(params.get_path("path").unwrap(), Some(PathBuf::from("/tmp/havoc")));
        assert_eq!(params.get_u64("missing").unwrap(), None);
    }

    #[test]
    fn test_parameter_type_mismatch() {
        let params = Parameters::new().with("cores", "many").with("target_mb", -5i64);
        assert!(params.get_u64("cores").is_err());
        assert!(params.get_u64("target_mb").is_err());
        assert!(params.get_str("target_mb").is_err());
    }

    #[test]
    fn test_definition_builder() {
        let def = ExperimentDefinition::builder()
            .name("cpu")
            .chaos_type(ChaosType::CpuStress)
            .duration(Duration::from_secs(2))
            .probability(1.0)
            .parameter("cores", 1i64)
            .build()
            .unwrap();

        assert_eq!(def.name, "cpu");
        assert_eq!(def.parameters.get_u64("cores").unwrap(), Some(1));
    }

    #[test]
    fn test_definition_validation() {
        let zero_duration = ExperimentDefinition::builder()
            .name("bad")
            .chaos_type(ChaosType::ProcessHang)
            .duration(Duration::ZERO)
            .build();
        assert!(zero_duration.is_err());

        let bad_probability = ExperimentDefinition::builder()
            .name("bad")
            .chaos_type(ChaosType::ProcessHang)
            .probability(1.2)
            .build();
        assert!(bad_probability.is_err());

        let no_type = ExperimentDefinition::builder().name("bad").build();
        assert!(no_type.is_err());
    }

    #[test]
    fn test_definition_from_json() {
        let json = r#"{
            "name": "Temporary Disk Fill",
            "type": "DISK_PRESSURE",
            "duration": "12s",
            "probability": 0.2,
            "parameters": { "target_mb": 20, "path": "/tmp" }
        }"#;

        let def: ExperimentDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.chaos_type, ChaosType::DiskPressure);
        assert_eq!(def.duration, Duration::from_secs(12));
        assert_eq!(def.parameters.get_u64("target_mb").unwrap(), Some(20));
    }
}
