//! The experiment catalog: validated definitions with resolved executors.

use super::executor::{Executor, ExecutorSet};
use super::ledger::ResourceLedger;
use super::types::{ChaosType, ExperimentDefinition};
use crate::error::{HavocError, Result};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A definition paired with the executor that runs it.
#[derive(Clone)]
pub struct CatalogEntry {
    pub definition: Arc<ExperimentDefinition>,
    pub executor: Arc<dyn Executor>,
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("definition", &self.definition)
            .field("executor", &self.executor.chaos_type())
            .finish()
    }
}

/// Immutable set of experiments the orchestrator draws from.
#[derive(Debug, Clone, Default)]
pub struct ExperimentCatalog {
    entries: Vec<CatalogEntry>,
    /// Ledger the resolved executors account against
    ledger: Arc<ResourceLedger>,
}

impl ExperimentCatalog {
    /// Validate `definitions` and resolve each one's executor.
    ///
    /// Names must be unique; each definition's parameters must be accepted
    /// by its executor.
    pub fn build(definitions: Vec<ExperimentDefinition>, executors: &ExecutorSet) -> Result<Self> {
        let mut names = HashSet::new();
        let mut entries = Vec::with_capacity(definitions.len());

        for definition in definitions {
            definition.validate()?;
            if !names.insert(definition.name.clone()) {
                return Err(HavocError::InvalidArgument(format!(
                    "Duplicate experiment name '{}'",
                    definition.name
                )));
            }

            let executor = executors.resolve(definition.chaos_type);
            executor.validate(&definition.parameters).map_err(|e| {
                HavocError::InvalidArgument(format!(
                    "Experiment '{}': {}",
                    definition.name, e
                ))
            })?;

            entries.push(CatalogEntry {
                definition: Arc::new(definition),
                executor,
            });
        }

        Ok(Self {
            entries,
            ledger: executors.ledger(),
        })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.definition.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ledger(&self) -> Arc<ResourceLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ExperimentDefinition> {
        self.entries.iter().map(|e| e.definition.as_ref())
    }
}

/// The default experiment set.
pub fn sample_definitions() -> Vec<ExperimentDefinition> {
    fn definition(
        name: &str,
        chaos_type: ChaosType,
        secs: u64,
        probability: f64,
    ) -> ExperimentDefinition {
        ExperimentDefinition {
            name: name.to_string(),
            chaos_type,
            duration: Duration::from_secs(secs),
            probability,
            parameters: Default::default(),
        }
    }

    let mut cpu = definition("Light CPU Stress", ChaosType::CpuStress, 10, 0.3);
    cpu.parameters.insert("cores", 2i64);

    let mut memory = definition("Memory Allocation Test", ChaosType::MemoryStress, 15, 0.2);
    memory.parameters.insert("target_mb", 50i64);

    let mut latency = definition(
        "Network Latency Simulation",
        ChaosType::NetworkLatency,
        8,
        0.4,
    );
    latency.parameters.insert("delay_ms", 500i64);

    let mut disruption = definition(
        "Service Disruption Test",
        ChaosType::ServiceDisruption,
        5,
        0.1,
    );
    disruption.parameters.insert("restart_after_s", 2.0);

    let mut disk = definition("Temporary Disk Fill", ChaosType::DiskPressure, 12, 0.2);
    disk.parameters.insert("target_mb", 20i64);

    let hang = definition("Process Hang Simulation", ChaosType::ProcessHang, 6, 0.3);

    vec![cpu, memory, latency, disruption, disk, hang]
}
