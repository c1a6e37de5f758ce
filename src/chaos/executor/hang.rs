//! Process hang: freeze the path to the target until the run stops.

use super::{ExecutionReport, Executor};
use crate::chaos::hooks::FaultHooks;
use crate::chaos::ledger::{ResourceKind, ResourceLedger};
use crate::chaos::signal::RunSignal;
use crate::chaos::types::{ChaosType, Parameters};
use crate::error::Result;
use std::sync::Arc;
use tracing::debug;

pub struct ProcessHangExecutor {
    hooks: Arc<FaultHooks>,
    ledger: Arc<ResourceLedger>,
}

impl ProcessHangExecutor {
    pub fn new(hooks: Arc<FaultHooks>, ledger: Arc<ResourceLedger>) -> Self {
        Self { hooks, ledger }
    }
}

#[async_trait::async_trait]
impl Executor for ProcessHangExecutor {
    fn chaos_type(&self) -> ChaosType {
        ChaosType::ProcessHang
    }

    async fn run(&self, _parameters: &Parameters, signal: RunSignal) -> Result<ExecutionReport> {
        let _hook = self.hooks.install_hang();
        let _entry = self.ledger.acquire(ResourceKind::Hooks, 1);
        debug!("Target frozen");

        let cause = signal.hold().await;
        Ok(ExecutionReport::stopped(cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::signal::StopCause;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_releases_hang() {
        let hooks = FaultHooks::new();
        let executor = ProcessHangExecutor::new(Arc::clone(&hooks), ResourceLedger::new());
        let signal = RunSignal::with_duration(Duration::from_secs(30));

        let run = {
            let signal = signal.clone();
            tokio::spawn(async move { executor.run(&Parameters::new(), signal).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(hooks.is_hung());

        signal.cancel();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.stopped_by, StopCause::Cancelled);
        assert!(!hooks.is_hung());
    }
}
