//! Experiment executors, one strategy per [`ChaosType`].
//!
//! An executor runs one bounded unit of chaos. It must observe its
//! [`RunSignal`] at least once per poll interval and must release everything
//! it acquired before returning, whichever way it returns. When its future is
//! dropped instead, release that cannot finish synchronously is completed by
//! [`Executor::cleanup`]. Every acquisition goes through the shared
//! [`ResourceLedger`] so that release can be checked.

mod cpu;
mod disk;
mod disruption;
mod hang;
mod memory;
mod network;

pub use cpu::CpuStressExecutor;
pub use disk::DiskPressureExecutor;
pub use disruption::ServiceDisruptionExecutor;
pub use hang::ProcessHangExecutor;
pub use memory::MemoryStressExecutor;
pub use network::NetworkLatencyExecutor;

use super::config::OrchestratorConfig;
use super::experiment::RunOutcome;
use super::hooks::FaultHooks;
use super::ledger::ResourceLedger;
use super::service::{HookedService, ServiceControl};
use super::signal::{RunSignal, StopCause};
use super::types::{ChaosType, Parameters};
use crate::error::Result;
use std::sync::Arc;

/// What an executor reports when it returns normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Why the executor stopped
    pub stopped_by: StopCause,
    /// A stress target that could not be fully reached
    pub shortfall: Option<String>,
}

impl ExecutionReport {
    pub fn stopped(stopped_by: StopCause) -> Self {
        Self {
            stopped_by,
            shortfall: None,
        }
    }

    pub fn with_shortfall(mut self, shortfall: Option<String>) -> Self {
        self.shortfall = shortfall;
        self
    }

    /// Terminal outcome for a run that ended with this report.
    pub fn into_outcome(self) -> RunOutcome {
        match self.stopped_by {
            StopCause::Cancelled => RunOutcome::aborted("cancelled"),
            StopCause::DeadlineReached => RunOutcome::Completed {
                shortfall: self.shortfall,
            },
        }
    }
}

/// A failure-injection strategy.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// The experiment kind this executor implements.
    fn chaos_type(&self) -> ChaosType;

    /// Reject parameters this executor cannot run with.
    fn validate(&self, _parameters: &Parameters) -> Result<()> {
        Ok(())
    }

    /// Run until the signal's deadline or cancellation.
    ///
    /// An `Err` is an executor fault: the run is recorded as failed.
    async fn run(&self, parameters: &Parameters, signal: RunSignal) -> Result<ExecutionReport>;

    /// Finish releasing whatever a torn-down run left behind.
    ///
    /// The orchestrator awaits this after every run, before recording its
    /// outcome. A run whose future was dropped mid-flight hands its pending
    /// release work over to here.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// One executor per chaos type, plus the shared state they act on.
#[derive(Clone)]
pub struct ExecutorSet {
    cpu: Arc<dyn Executor>,
    memory: Arc<dyn Executor>,
    network: Arc<dyn Executor>,
    disruption: Arc<dyn Executor>,
    disk: Arc<dyn Executor>,
    hang: Arc<dyn Executor>,
    hooks: Arc<FaultHooks>,
    ledger: Arc<ResourceLedger>,
}

impl ExecutorSet {
    /// Standard executors acting on fresh hooks and a fresh ledger, with the
    /// target disrupted through the hooks.
    pub fn standard(config: &OrchestratorConfig) -> Self {
        let hooks = FaultHooks::new();
        let service = Arc::new(HookedService::new(Arc::clone(&hooks)));
        Self::with_parts(config, hooks, ResourceLedger::new(), service)
    }

    /// Standard executors over caller-supplied shared state.
    pub fn with_parts(
        config: &OrchestratorConfig,
        hooks: Arc<FaultHooks>,
        ledger: Arc<ResourceLedger>,
        service: Arc<dyn ServiceControl>,
    ) -> Self {
        let scratch_dir = config
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        Self {
            cpu: Arc::new(CpuStressExecutor::new(Arc::clone(&ledger))),
            memory: Arc::new(MemoryStressExecutor::new(
                Arc::clone(&ledger),
                config.memory_ceiling_fraction,
            )),
            network: Arc::new(NetworkLatencyExecutor::new(
                Arc::clone(&hooks),
                Arc::clone(&ledger),
            )),
            disruption: Arc::new(ServiceDisruptionExecutor::new(service, Arc::clone(&ledger))),
            disk: Arc::new(DiskPressureExecutor::new(scratch_dir, Arc::clone(&ledger))),
            hang: Arc::new(ProcessHangExecutor::new(
                Arc::clone(&hooks),
                Arc::clone(&ledger),
            )),
            hooks,
            ledger,
        }
    }

    /// Replace the executor for `executor.chaos_type()`.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        match executor.chaos_type() {
            ChaosType::CpuStress => self.cpu = executor,
            ChaosType::MemoryStress => self.memory = executor,
            ChaosType::NetworkLatency => self.network = executor,
            ChaosType::ServiceDisruption => self.disruption = executor,
            ChaosType::DiskPressure => self.disk = executor,
            ChaosType::ProcessHang => self.hang = executor,
        }
        self
    }

    pub fn resolve(&self, chaos_type: ChaosType) -> Arc<dyn Executor> {
        let executor = match chaos_type {
            ChaosType::CpuStress => &self.cpu,
            ChaosType::MemoryStress => &self.memory,
            ChaosType::NetworkLatency => &self.network,
            ChaosType::ServiceDisruption => &self.disruption,
            ChaosType::DiskPressure => &self.disk,
            ChaosType::ProcessHang => &self.hang,
        };
        Arc::clone(executor)
    }

    pub fn hooks(&self) -> Arc<FaultHooks> {
        Arc::clone(&self.hooks)
    }

    pub fn ledger(&self) -> Arc<ResourceLedger> {
        Arc::clone(&self.ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait::async_trait]
    impl Executor for Failing {
        fn chaos_type(&self) -> ChaosType {
            ChaosType::DiskPressure
        }

        async fn run(&self, _: &Parameters, _: RunSignal) -> Result<ExecutionReport> {
            Err(crate::error::HavocError::ExecutorFault("boom".into()))
        }
    }

    #[test]
    fn test_resolve_matches_type() {
        let set = ExecutorSet::standard(&OrchestratorConfig::default());
        for chaos_type in ChaosType::ALL {
            assert_eq!(set.resolve(chaos_type).chaos_type(), chaos_type);
        }
    }

    #[tokio::test]
    async fn test_with_executor_replaces_slot() {
        let set = ExecutorSet::standard(&OrchestratorConfig::default())
            .with_executor(Arc::new(Failing));
        let executor = set.resolve(ChaosType::DiskPressure);
        let result = executor
            .run(&Parameters::new(), RunSignal::with_duration(std::time::Duration::from_millis(10)))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_report_outcome() {
        let report = ExecutionReport::stopped(StopCause::DeadlineReached)
            .with_shortfall(Some("reached 10 of 20 MB".into()));
        assert_eq!(
            report.into_outcome(),
            RunOutcome::Completed {
                shortfall: Some("reached 10 of 20 MB".into())
            }
        );
        assert!(ExecutionReport::stopped(StopCause::Cancelled)
            .into_outcome()
            .is_aborted());
    }
}
