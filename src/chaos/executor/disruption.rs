//! Service disruption: take the target down, optionally bring it back early.

use super::{ExecutionReport, Executor};
use crate::chaos::ledger::{LedgerEntry, ResourceKind, ResourceLedger};
use crate::chaos::service::ServiceControl;
use crate::chaos::signal::RunSignal;
use crate::chaos::types::{ChaosType, Parameters};
use crate::error::{HavocError, Result};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Resumes started by dropped runs, awaited by `cleanup`.
type PendingResumes = Arc<Mutex<Vec<JoinHandle<()>>>>;

pub struct ServiceDisruptionExecutor {
    service: Arc<dyn ServiceControl>,
    ledger: Arc<ResourceLedger>,
    pending: PendingResumes,
}

impl ServiceDisruptionExecutor {
    pub fn new(service: Arc<dyn ServiceControl>, ledger: Arc<ResourceLedger>) -> Self {
        Self {
            service,
            ledger,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn restart_after(parameters: &Parameters) -> Result<Option<Duration>> {
        match parameters.get_f64("restart_after_s")? {
            None => Ok(None),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|_| {
                    HavocError::invalid_parameter(
                        "restart_after_s",
                        "must be a non-negative number of seconds",
                    )
                }),
        }
    }
}

/// Keeps the target suspended; starts a resume when dropped without an
/// explicit [`SuspendedTarget::resume`] and parks it in `pending`.
struct SuspendedTarget {
    service: Option<Arc<dyn ServiceControl>>,
    entry: Option<LedgerEntry>,
    pending: PendingResumes,
}

impl SuspendedTarget {
    async fn resume(&mut self) -> Result<()> {
        if let Some(service) = &self.service {
            service.resume().await?;
            self.service = None;
            self.entry = None;
        }
        Ok(())
    }
}

impl Drop for SuspendedTarget {
    fn drop(&mut self) {
        let Some(service) = self.service.take() else {
            return;
        };
        let entry = self.entry.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let resume = handle.spawn(async move {
                    if let Err(e) = service.resume().await {
                        warn!(error = %e, "Failed to resume target after abort");
                    }
                    drop(entry);
                });
                self.pending.lock().push(resume);
            }
            Err(_) => warn!("No runtime available to resume target"),
        }
    }
}

#[async_trait::async_trait]
impl Executor for ServiceDisruptionExecutor {
    fn chaos_type(&self) -> ChaosType {
        ChaosType::ServiceDisruption
    }

    fn validate(&self, parameters: &Parameters) -> Result<()> {
        Self::restart_after(parameters).map(|_| ())
    }

    async fn run(&self, parameters: &Parameters, signal: RunSignal) -> Result<ExecutionReport> {
        let restart_after = Self::restart_after(parameters)?;

        self.service.suspend().await?;
        let mut target = SuspendedTarget {
            service: Some(Arc::clone(&self.service)),
            entry: Some(self.ledger.acquire(ResourceKind::Hooks, 1)),
            pending: Arc::clone(&self.pending),
        };
        info!("Target service suspended");

        let cause = match restart_after {
            Some(delay) if delay < signal.remaining() => match signal.sleep(delay).await {
                Some(cause) => cause,
                None => {
                    target.resume().await?;
                    info!(after_s = delay.as_secs_f64(), "Target service restarted");
                    signal.hold().await
                }
            },
            _ => signal.hold().await,
        };

        if target.service.is_some() {
            target.resume().await?;
            info!("Target service restarted at end of run");
        }
        Ok(ExecutionReport::stopped(cause))
    }

    async fn cleanup(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return Ok(());
        }

        let failed = join_all(pending)
            .await
            .into_iter()
            .filter(|r| r.is_err())
            .count();
        if failed > 0 {
            return Err(HavocError::ExecutorFault(format!(
                "{} target resumes did not finish",
                failed
            )));
        }
        info!("Target service restarted after abort");
        Ok(())
    }
}
