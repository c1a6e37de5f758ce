//! Network latency: delay calls to the target through the fault hooks.

use super::{ExecutionReport, Executor};
use crate::chaos::hooks::FaultHooks;
use crate::chaos::ledger::{ResourceKind, ResourceLedger};
use crate::chaos::signal::RunSignal;
use crate::chaos::types::{ChaosType, Parameters};
use crate::error::{HavocError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 60_000;

pub struct NetworkLatencyExecutor {
    hooks: Arc<FaultHooks>,
    ledger: Arc<ResourceLedger>,
}

impl NetworkLatencyExecutor {
    pub fn new(hooks: Arc<FaultHooks>, ledger: Arc<ResourceLedger>) -> Self {
        Self { hooks, ledger }
    }

    fn delay(parameters: &Parameters) -> Result<Duration> {
        let ms = parameters.get_u64("delay_ms")?.unwrap_or(DEFAULT_DELAY_MS);
        if ms == 0 || ms > MAX_DELAY_MS {
            return Err(HavocError::invalid_parameter(
                "delay_ms",
                format!("must be between 1 and {}", MAX_DELAY_MS),
            ));
        }
        Ok(Duration::from_millis(ms))
    }
}

#[async_trait::async_trait]
impl Executor for NetworkLatencyExecutor {
    fn chaos_type(&self) -> ChaosType {
        ChaosType::NetworkLatency
    }

    fn validate(&self, parameters: &Parameters) -> Result<()> {
        Self::delay(parameters).map(|_| ())
    }

    async fn run(&self, parameters: &Parameters, signal: RunSignal) -> Result<ExecutionReport> {
        let delay = Self::delay(parameters)?;

        let _hook = self.hooks.install_latency(delay);
        let _entry = self.ledger.acquire(ResourceKind::Hooks, 1);
        debug!(delay_ms = delay.as_millis() as u64, "Latency injected");

        let cause = signal.hold().await;
        Ok(ExecutionReport::stopped(cause))
    }
}
