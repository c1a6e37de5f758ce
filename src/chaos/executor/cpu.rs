//! CPU stress: busy worker threads until the run stops.

use super::{ExecutionReport, Executor};
use crate::chaos::ledger::{ResourceKind, ResourceLedger};
use crate::chaos::signal::RunSignal;
use crate::chaos::types::{ChaosType, Parameters};
use crate::error::{HavocError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_CORES: u64 = 2;
const MAX_CORES: u64 = 256;
/// Iterations of busy work between stop checks.
const SPIN_BATCH: u32 = 50_000;
/// How often a join checks whether stopped workers have exited.
const JOIN_POLL: Duration = Duration::from_millis(5);

pub struct CpuStressExecutor {
    ledger: Arc<ResourceLedger>,
    /// Workers of dropped runs, joined by `cleanup`
    orphans: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl CpuStressExecutor {
    pub fn new(ledger: Arc<ResourceLedger>) -> Self {
        Self {
            ledger,
            orphans: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn cores(parameters: &Parameters) -> Result<u64> {
        let cores = parameters.get_u64("cores")?.unwrap_or(DEFAULT_CORES);
        if cores == 0 || cores > MAX_CORES {
            return Err(HavocError::invalid_parameter(
                "cores",
                format!("must be between 1 and {}", MAX_CORES),
            ));
        }
        Ok(cores)
    }
}

/// Running workers. Dropping raises the stop flag; handles not yet joined
/// are parked with the executor so `cleanup` can join them.
struct Workers {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    orphans: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Workers {
    /// Stop the workers and wait for them. Returns how many panicked.
    async fn shutdown(mut self) -> usize {
        self.stop.store(true, Ordering::SeqCst);
        join_workers(&mut self.handles).await
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if !self.handles.is_empty() {
            self.orphans.lock().append(&mut self.handles);
        }
    }
}

/// Wait until every stopped worker has exited, then join them all. Handles
/// stay in `handles` until joined. Returns how many panicked.
async fn join_workers(handles: &mut Vec<JoinHandle<()>>) -> usize {
    while handles.iter().any(|h| !h.is_finished()) {
        tokio::time::sleep(JOIN_POLL).await;
    }
    handles
        .drain(..)
        .map(|h| h.join())
        .filter(|r| r.is_err())
        .count()
}

fn spin(stop: &AtomicBool, signal: &RunSignal) {
    let mut acc: u64 = 0x9E37_79B9_7F4A_7C15;
    while !stop.load(Ordering::Relaxed) && signal.check().is_none() {
        for i in 0..SPIN_BATCH {
            acc = acc.rotate_left(5) ^ u64::from(i);
            acc = acc.wrapping_mul(0x100_0000_01B3);
        }
        std::hint::black_box(acc);
    }
}

#[async_trait::async_trait]
impl Executor for CpuStressExecutor {
    fn chaos_type(&self) -> ChaosType {
        ChaosType::CpuStress
    }

    fn validate(&self, parameters: &Parameters) -> Result<()> {
        Self::cores(parameters).map(|_| ())
    }

    async fn run(&self, parameters: &Parameters, signal: RunSignal) -> Result<ExecutionReport> {
        let cores = Self::cores(parameters)?;
        let stop = Arc::new(AtomicBool::new(false));
        let mut workers = Workers {
            stop: Arc::clone(&stop),
            handles: Vec::with_capacity(cores as usize),
            orphans: Arc::clone(&self.orphans),
        };

        for n in 0..cores {
            let entry = self.ledger.acquire(ResourceKind::WorkerThreads, 1);
            let stop = Arc::clone(&stop);
            let signal = signal.clone();
            let spawned = thread::Builder::new()
                .name(format!("havoc-cpu-{}", n))
                .spawn(move || {
                    let _entry = entry;
                    spin(&stop, &signal);
                });
            match spawned {
                Ok(handle) => workers.handles.push(handle),
                Err(e) => {
                    // dropping `workers` stops whatever already started
                    return Err(HavocError::ExecutorFault(format!(
                        "failed to spawn cpu worker: {}",
                        e
                    )));
                }
            }
        }
        debug!(cores, "CPU stress workers started");

        let cause = signal.hold().await;
        let joined = workers.shutdown().await;

        if joined > 0 {
            warn!(panicked = joined, "CPU stress workers panicked");
            return Err(HavocError::ExecutorFault(format!(
                "{} cpu workers panicked",
                joined
            )));
        }

        Ok(ExecutionReport::stopped(cause))
    }

    async fn cleanup(&self) -> Result<()> {
        let mut orphans = std::mem::take(&mut *self.orphans.lock());
        if orphans.is_empty() {
            return Ok(());
        }

        let count = orphans.len();
        let panicked = join_workers(&mut orphans).await;
        if panicked > 0 {
            return Err(HavocError::ExecutorFault(format!(
                "{} cpu workers panicked",
                panicked
            )));
        }
        info!(workers = count, "CPU stress workers of aborted run joined");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::signal::StopCause;
    use std::time::{Duration, Instant};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_workers_stop_at_deadline() {
        let ledger = ResourceLedger::new();
        let executor = CpuStressExecutor::new(Arc::clone(&ledger));
        let params = Parameters::new().with("cores", 2i64);

        let started = Instant::now();
        let report = executor
            .run(&params, RunSignal::with_duration(Duration::from_millis(300)))
            .await
            .unwrap();

        assert_eq!(report.stopped_by, StopCause::DeadlineReached);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(ledger.held(ResourceKind::WorkerThreads), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cleanup_joins_workers_of_dropped_run() {
        let ledger = ResourceLedger::new();
        let executor = Arc::new(CpuStressExecutor::new(Arc::clone(&ledger)));

        let run = {
            let executor = Arc::clone(&executor);
            let signal = RunSignal::with_duration(Duration::from_secs(30));
            tokio::spawn(async move {
                executor
                    .run(&Parameters::new().with("cores", 2i64), signal)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ledger.held(ResourceKind::WorkerThreads), 2);

        run.abort();
        let _ = run.await;
        executor.cleanup().await.unwrap();

        assert_eq!(ledger.held(ResourceKind::WorkerThreads), 0);
        assert!(executor.orphans.lock().is_empty());
    }

    #[test]
    fn test_rejects_zero_cores() {
        let executor = CpuStressExecutor::new(ResourceLedger::new());
        assert!(executor
            .validate(&Parameters::new().with("cores", 0i64))
            .is_err());
        assert!(executor.validate(&Parameters::new()).is_ok());
    }
}
