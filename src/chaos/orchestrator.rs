//! Chaos orchestrator: scheduling, dispatch and bounded termination.

use super::catalog::{CatalogEntry, ExperimentCatalog};
use super::config::OrchestratorConfig;
use super::experiment::{ActiveRunSnapshot, ExperimentRun, RunOutcome};
use super::ledger::ResourceLedger;
use super::rng::{RandomSource, SeededRandom};
use super::signal::RunSignal;
use super::types::ChaosType;
use crate::error::{HavocError, Result};
use crate::observability;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const FORCED_SHUTDOWN: &str = "forced shutdown";
const DEADLINE_EXCEEDED: &str = "deadline exceeded";
const ORCHESTRATOR_STOPPED: &str = "orchestrator stopped";

// ============================================================================
// Events
// ============================================================================

/// Events emitted by the chaos orchestrator
#[derive(Debug, Clone)]
pub enum ChaosEvent {
    ExperimentTriggered {
        run_id: String,
        name: String,
        chaos_type: ChaosType,
    },
    ExperimentFinished {
        run: ExperimentRun,
    },
}

/// Result of [`ChaosOrchestrator::stop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSummary {
    /// Runs that ended on their own within the grace period
    pub drained: usize,
    /// Runs that had to be force-aborted
    pub forced: usize,
}

// ============================================================================
// Chaos Orchestrator
// ============================================================================

/// Schedules experiments from a catalog and guarantees they terminate.
pub struct ChaosOrchestrator {
    inner: Arc<Inner>,
    tick_loop: tokio::sync::Mutex<Option<TickLoop>>,
    /// Held for the whole of a `stop()` drain
    stopping: tokio::sync::Mutex<()>,
}

struct TickLoop {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    config: OrchestratorConfig,
    /// Running experiments keyed by definition name
    active: RwLock<HashMap<String, ActiveRun>>,
    /// Finished runs in completion order
    history: RwLock<Vec<ExperimentRun>>,
    random: Mutex<Box<dyn RandomSource>>,
    event_tx: broadcast::Sender<ChaosEvent>,
}

struct ActiveRun {
    run: ExperimentRun,
    started: Instant,
    signal: RunSignal,
    /// Tears the executor down without waiting for it to notice cancellation
    force: CancellationToken,
    cancel_reason: Arc<Mutex<Option<String>>>,
    supervisor: Option<JoinHandle<()>>,
    ledger: Arc<ResourceLedger>,
}

impl ActiveRun {
    fn request_cancel(&self, reason: &str) {
        self.cancel_reason
            .lock()
            .get_or_insert_with(|| reason.to_string());
        self.signal.cancel();
    }

    fn snapshot(&self) -> ActiveRunSnapshot {
        ActiveRunSnapshot {
            run_id: self.run.id.clone(),
            name: self.run.name().to_string(),
            chaos_type: self.run.chaos_type(),
            started_at: self.run.start_time,
            elapsed: self.started.elapsed(),
            remaining: self.signal.remaining(),
            cancelling: self.signal.is_cancelled(),
            resources: self.ledger.snapshot(),
        }
    }
}

/// Aborts the executor task if the supervisor is torn down first.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl ChaosOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let random: Box<dyn RandomSource> = match config.seed {
            Some(seed) => Box::new(SeededRandom::new(seed)),
            None => Box::new(SeededRandom::from_entropy()),
        };
        let (event_tx, _) = broadcast::channel(1000);

        Self {
            inner: Arc::new(Inner {
                config,
                active: RwLock::new(HashMap::new()),
                history: RwLock::new(Vec::new()),
                random: Mutex::new(random),
                event_tx,
            }),
            tick_loop: tokio::sync::Mutex::new(None),
            stopping: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the source of trigger draws.
    pub fn with_random_source(self, source: Box<dyn RandomSource>) -> Self {
        *self.inner.random.lock() = source;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Subscribe to chaos events
    pub fn subscribe(&self) -> broadcast::Receiver<ChaosEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Start the scheduling loop.
    ///
    /// The first tick fires immediately. A tick that overruns the interval
    /// delays the next one; ticks never overlap.
    pub async fn start(&self, catalog: Arc<ExperimentCatalog>, tick_interval: Duration) -> Result<()> {
        if tick_interval.is_zero() {
            return Err(HavocError::InvalidArgument(
                "Tick interval must be positive".into(),
            ));
        }

        let mut slot = self.tick_loop.lock().await;
        if slot.as_ref().is_some_and(|l| !l.handle.is_finished()) {
            return Err(HavocError::AlreadyRunning("chaos orchestrator".into()));
        }

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let inner = Arc::clone(&self.inner);
        let experiments = catalog.len();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let triggered = inner.tick(&catalog).await;
                        debug!(triggered = triggered.len(), "Chaos tick completed");
                    }
                }
            }
        });

        info!(experiments, interval = ?tick_interval, "Chaos scheduling loop started");
        *slot = Some(TickLoop { shutdown, handle });
        Ok(())
    }

    /// Whether the scheduling loop is running.
    pub async fn is_running(&self) -> bool {
        self.tick_loop
            .lock()
            .await
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }

    /// Run one trigger pass over `catalog`, returning the names triggered.
    pub async fn tick(&self, catalog: &ExperimentCatalog) -> Vec<String> {
        self.inner.tick(catalog).await
    }

    /// Stop scheduling and wait for active runs to end.
    ///
    /// Runs still active after the grace period are force-aborted and
    /// recorded as `Aborted("forced shutdown")` once their executor's cleanup
    /// has finished, so the forced path can take up to
    /// `stop_grace_period + deadline_slack + cleanup_timeout`.
    ///
    /// Concurrent callers are serialized: a second `stop()` waits for the
    /// first to finish draining and then reports an empty summary.
    pub async fn stop(&self) -> Result<StopSummary> {
        let _stopping = self.stopping.lock().await;

        if let Some(tick_loop) = self.tick_loop.lock().await.take() {
            tick_loop.shutdown.cancel();
            if let Err(e) = tick_loop.handle.await {
                error!(error = %e, "Chaos scheduling loop ended abnormally");
            }
            info!("Chaos scheduling loop stopped");
        }

        let inner = &self.inner;
        let mut supervisors = Vec::new();
        {
            let mut active = inner.active.write().await;
            for run in active.values_mut() {
                run.request_cancel(ORCHESTRATOR_STOPPED);
                if let Some(handle) = run.supervisor.take() {
                    supervisors.push((run.run.id.clone(), handle));
                }
            }
        }

        let in_flight = supervisors.len();
        if in_flight == 0 {
            return Ok(StopSummary::default());
        }
        info!(in_flight, grace = ?inner.config.stop_grace_period, "Waiting for experiments to finish");

        let drained_in_time = tokio::time::timeout(
            inner.config.stop_grace_period,
            join_all(supervisors.iter_mut().map(|(_, h)| h)),
        )
        .await
        .is_ok();

        if drained_in_time {
            return Ok(StopSummary {
                drained: in_flight,
                forced: 0,
            });
        }

        let stuck: HashSet<String> = supervisors
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        warn!(
            stuck = stuck.len(),
            "Grace period elapsed with experiments still active, forcing abort"
        );

        for run in inner.active.read().await.values() {
            if stuck.contains(&run.run.id) {
                run.force.cancel();
            }
        }

        let mut remaining: Vec<_> = supervisors
            .into_iter()
            .filter(|(id, _)| stuck.contains(id))
            .collect();
        let settled = tokio::time::timeout(
            inner.config.deadline_slack + inner.config.cleanup_timeout,
            join_all(remaining.iter_mut().map(|(_, h)| h)),
        )
        .await
        .is_ok();

        if !settled {
            for (id, handle) in &remaining {
                if !handle.is_finished() {
                    handle.abort();
                    let name = inner
                        .active
                        .read()
                        .await
                        .values()
                        .find(|r| &r.run.id == id)
                        .map(|r| r.run.name().to_string());
                    if let Some(name) = name {
                        error!(experiment = %name, run_id = %id, "Supervisor unresponsive, recording forced abort");
                        inner.finish(&name, id, forced_abort(FORCED_SHUTDOWN)).await;
                    }
                }
            }
        }

        Ok(StopSummary {
            drained: in_flight - stuck.len(),
            forced: stuck.len(),
        })
    }

    /// Request cancellation of the named experiment's active run.
    pub async fn cancel_run(&self, name: &str) -> Result<()> {
        let active = self.inner.active.read().await;
        match active.get(name) {
            Some(run) => {
                info!(experiment = %name, run_id = %run.run.id, "Cancelling experiment");
                run.request_cancel("cancelled");
                Ok(())
            }
            None => Err(HavocError::NotFound(format!(
                "No active run for experiment '{}'",
                name
            ))),
        }
    }

    /// Point-in-time view of running experiments, oldest first.
    pub async fn active_runs(&self) -> Vec<ActiveRunSnapshot> {
        let mut runs: Vec<_> = self
            .inner
            .active
            .read()
            .await
            .values()
            .map(ActiveRun::snapshot)
            .collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    /// Finished runs in completion order.
    pub async fn history(&self) -> Vec<ExperimentRun> {
        self.inner.history.read().await.clone()
    }
}

impl Drop for ChaosOrchestrator {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.tick_loop.try_lock() {
            if let Some(tick_loop) = slot.take() {
                tick_loop.shutdown.cancel();
            }
        }
    }
}

impl Inner {
    async fn tick(self: &Arc<Self>, catalog: &ExperimentCatalog) -> Vec<String> {
        let mut triggered = Vec::new();

        for entry in catalog.entries() {
            let name = &entry.definition.name;
            if self.active.read().await.contains_key(name) {
                debug!(experiment = %name, "Experiment still running, not eligible");
                continue;
            }

            let draw = self.random.lock().next_f64();
            if draw < entry.definition.probability && self.dispatch(entry, catalog.ledger()).await {
                triggered.push(name.clone());
            }
        }

        triggered
    }

    /// Register and launch a run. Returns false if one is already active.
    async fn dispatch(self: &Arc<Self>, entry: &CatalogEntry, ledger: Arc<ResourceLedger>) -> bool {
        let definition = &entry.definition;
        let mut active = self.active.write().await;
        if active.contains_key(&definition.name) {
            return false;
        }

        let run = ExperimentRun::start(Arc::clone(definition));
        let started = Instant::now();
        let signal = RunSignal::new(
            CancellationToken::new(),
            started + definition.duration,
            self.config.poll_interval,
        );
        let force = CancellationToken::new();
        let cancel_reason = Arc::new(Mutex::new(None));

        info!(
            experiment = %definition.name,
            run_id = %run.id,
            chaos_type = %definition.chaos_type,
            duration = ?definition.duration,
            "Experiment triggered"
        );
        observability::record_experiment_triggered(definition.chaos_type.as_str());
        let _ = self.event_tx.send(ChaosEvent::ExperimentTriggered {
            run_id: run.id.clone(),
            name: definition.name.clone(),
            chaos_type: definition.chaos_type,
        });

        let supervisor = tokio::spawn(Arc::clone(self).supervise(
            entry.clone(),
            run.id.clone(),
            signal.clone(),
            force.clone(),
            Arc::clone(&cancel_reason),
        ));

        active.insert(
            definition.name.clone(),
            ActiveRun {
                run,
                started,
                signal,
                force,
                cancel_reason,
                supervisor: Some(supervisor),
                ledger,
            },
        );
        true
    }

    /// Drive one run to a terminal outcome. Executor errors and panics stop
    /// here and never reach the scheduling loop. The executor's cleanup is
    /// awaited before the outcome is recorded.
    async fn supervise(
        self: Arc<Self>,
        entry: CatalogEntry,
        run_id: String,
        signal: RunSignal,
        force: CancellationToken,
        cancel_reason: Arc<Mutex<Option<String>>>,
    ) {
        let executor = Arc::clone(&entry.executor);
        let definition = Arc::clone(&entry.definition);
        let executor_signal = signal.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move {
            executor
                .run(&definition.parameters, executor_signal)
                .await
        }));
        let overrun = tokio::time::Instant::from_std(signal.deadline() + self.config.deadline_slack);

        let outcome = tokio::select! {
            biased;
            joined = &mut task.0 => settle(joined),
            _ = force.cancelled() => {
                signal.cancel();
                task.0.abort();
                let _ = (&mut task.0).await;
                forced_abort(FORCED_SHUTDOWN)
            }
            _ = tokio::time::sleep_until(overrun) => {
                signal.cancel();
                task.0.abort();
                let _ = (&mut task.0).await;
                forced_abort(DEADLINE_EXCEEDED)
            }
        };

        let name = &entry.definition.name;
        match tokio::time::timeout(self.config.cleanup_timeout, entry.executor.cleanup()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(experiment = %name, run_id = %run_id, error = %e, "Experiment cleanup failed")
            }
            Err(_) => error!(
                experiment = %name,
                run_id = %run_id,
                timeout = ?self.config.cleanup_timeout,
                "Experiment cleanup did not finish in time"
            ),
        }

        let outcome = match outcome {
            RunOutcome::Aborted { reason } if reason == "cancelled" => {
                RunOutcome::aborted(cancel_reason.lock().clone().unwrap_or(reason))
            }
            other => other,
        };

        self.finish(name, &run_id, outcome).await;
    }

    /// Move a run from the registry to history. No-op if `run_id` is no
    /// longer the active run for `name`.
    async fn finish(&self, name: &str, run_id: &str, outcome: RunOutcome) {
        let mut active = self.active.write().await;
        let is_current = active.get(name).is_some_and(|r| r.run.id == run_id);
        if !is_current {
            return;
        }
        let Some(entry) = active.remove(name) else {
            return;
        };

        let mut run = entry.run;
        run.finish(outcome.clone());
        let elapsed = entry.started.elapsed();

        match &outcome {
            RunOutcome::Completed { shortfall: None } => {
                info!(experiment = %name, run_id = %run_id, ?elapsed, "Experiment completed")
            }
            RunOutcome::Completed {
                shortfall: Some(shortfall),
            } => warn!(experiment = %name, run_id = %run_id, ?elapsed, %shortfall, "Experiment completed with shortfall"),
            RunOutcome::Aborted { reason } => {
                warn!(experiment = %name, run_id = %run_id, ?elapsed, %reason, "Experiment aborted")
            }
            RunOutcome::Failed { reason } => {
                error!(experiment = %name, run_id = %run_id, ?elapsed, %reason, "Experiment failed")
            }
        }
        observability::record_experiment_finished(outcome.label());

        self.history.write().await.push(run.clone());
        drop(active);

        let _ = self.event_tx.send(ChaosEvent::ExperimentFinished { run });
    }
}

fn forced_abort(reason: &str) -> RunOutcome {
    HavocError::ForcedAbort(reason.to_string()).into()
}

fn settle(joined: std::result::Result<Result<super::executor::ExecutionReport>, JoinError>) -> RunOutcome {
    match joined {
        Ok(Ok(report)) => report.into_outcome(),
        Ok(Err(e)) => e.into(),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            RunOutcome::failed(format!("executor panicked: {}", message))
        }
        Err(e) => RunOutcome::aborted(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::executor::{ExecutionReport, Executor, ExecutorSet};
    use crate::chaos::rng::ScriptedRandom;
    use crate::chaos::types::{ExperimentDefinition, Parameters};

    /// Holds until stopped, optionally ignoring cancellation.
    struct Sleeper {
        stubborn: bool,
    }

    #[async_trait::async_trait]
    impl Executor for Sleeper {
        fn chaos_type(&self) -> ChaosType {
            ChaosType::ProcessHang
        }

        async fn run(&self, _: &Parameters, signal: RunSignal) -> Result<ExecutionReport> {
            if self.stubborn {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(ExecutionReport::stopped(signal.hold().await))
        }
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            stop_grace_period: Duration::from_millis(300),
            deadline_slack: Duration::from_millis(200),
            poll_interval: Duration::from_millis(20),
            seed: Some(1),
            ..Default::default()
        }
    }

    fn catalog(executor: Sleeper, duration: Duration) -> ExperimentCatalog {
        let executors = ExecutorSet::standard(&config()).with_executor(Arc::new(executor));
        let definition = ExperimentDefinition::builder()
            .name("sleeper")
            .chaos_type(ChaosType::ProcessHang)
            .duration(duration)
            .probability(1.0)
            .build()
            .unwrap();
        ExperimentCatalog::build(vec![definition], &executors).unwrap()
    }

    #[tokio::test]
    async fn test_tick_respects_single_active_run() {
        let orchestrator = ChaosOrchestrator::new(config())
            .with_random_source(Box::new(ScriptedRandom::constant(0.0)));
        let catalog = catalog(Sleeper { stubborn: false }, Duration::from_secs(5));

        assert_eq!(orchestrator.tick(&catalog).await, vec!["sleeper".to_string()]);
        assert!(orchestrator.tick(&catalog).await.is_empty());
        assert_eq!(orchestrator.active_runs().await.len(), 1);

        let summary = orchestrator.stop().await.unwrap();
        assert_eq!(summary, StopSummary { drained: 1, forced: 0 });

        let history = orchestrator.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].outcome,
            Some(RunOutcome::aborted(ORCHESTRATOR_STOPPED))
        );
    }

    #[tokio::test]
    async fn test_stubborn_executor_is_forced() {
        let orchestrator = ChaosOrchestrator::new(config())
            .with_random_source(Box::new(ScriptedRandom::constant(0.0)));
        let catalog = catalog(Sleeper { stubborn: true }, Duration::from_secs(60));

        orchestrator.tick(&catalog).await;
        let started = Instant::now();
        let summary = orchestrator.stop().await.unwrap();

        assert_eq!(summary.forced, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(orchestrator.active_runs().await.is_empty());
        assert_eq!(
            orchestrator.history().await[0].outcome,
            Some(RunOutcome::aborted(FORCED_SHUTDOWN))
        );
    }

    #[tokio::test]
    async fn test_overrun_is_aborted_at_deadline() {
        let orchestrator = ChaosOrchestrator::new(config())
            .with_random_source(Box::new(ScriptedRandom::constant(0.0)));
        let catalog = catalog(Sleeper { stubborn: true }, Duration::from_millis(100));

        orchestrator.tick(&catalog).await;
        tokio::time::sleep(Duration::from_millis(600)).await;

        let history = orchestrator.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].outcome,
            Some(RunOutcome::aborted(DEADLINE_EXCEEDED))
        );

        // aborted at deadline + slack, plus scheduling latency
        let bound = Duration::from_millis(100) + config().deadline_slack + Duration::from_millis(50);
        let elapsed = history[0].elapsed().unwrap();
        assert!(elapsed <= bound, "run took {:?}, bound {:?}", elapsed, bound);
    }

    #[tokio::test]
    async fn test_active_runs_report_held_resources() {
        let executors = ExecutorSet::standard(&config());
        let definition = ExperimentDefinition::builder()
            .name("hang")
            .chaos_type(ChaosType::ProcessHang)
            .duration(Duration::from_secs(5))
            .probability(1.0)
            .build()
            .unwrap();
        let catalog = ExperimentCatalog::build(vec![definition], &executors).unwrap();
        let orchestrator = ChaosOrchestrator::new(config())
            .with_random_source(Box::new(ScriptedRandom::constant(0.0)));

        orchestrator.tick(&catalog).await;
        let mut hooks_held = 0;
        for _ in 0..100 {
            let runs = orchestrator.active_runs().await;
            hooks_held = runs[0].resources.hooks;
            if hooks_held > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hooks_held, 1);

        orchestrator.stop().await.unwrap();
        assert!(executors.ledger().snapshot().is_clean());
    }

    #[tokio::test]
    async fn test_concurrent_stop_waits_for_drain() {
        let orchestrator = Arc::new(
            ChaosOrchestrator::new(config())
                .with_random_source(Box::new(ScriptedRandom::constant(0.0))),
        );
        let catalog = catalog(Sleeper { stubborn: true }, Duration::from_secs(60));
        orchestrator.tick(&catalog).await;

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = orchestrator.stop().await.unwrap();
        assert_eq!(second, StopSummary::default());
        // by the time the second caller returns the run is recorded
        assert!(orchestrator.active_runs().await.is_empty());
        assert_eq!(orchestrator.history().await.len(), 1);

        assert_eq!(first.await.unwrap().unwrap().forced, 1);
    }

    #[tokio::test]
    async fn test_cancel_run() {
        let orchestrator = ChaosOrchestrator::new(config())
            .with_random_source(Box::new(ScriptedRandom::constant(0.0)));
        let catalog = catalog(Sleeper { stubborn: false }, Duration::from_secs(5));
        let mut events = orchestrator.subscribe();

        assert!(orchestrator.cancel_run("sleeper").await.is_err());
        orchestrator.tick(&catalog).await;
        orchestrator.cancel_run("sleeper").await.unwrap();

        let mut finished = None;
        while finished.is_none() {
            if let ChaosEvent::ExperimentFinished { run } = events.recv().await.unwrap() {
                finished = Some(run);
            }
        }
        assert_eq!(
            finished.unwrap().outcome,
            Some(RunOutcome::aborted("cancelled"))
        );
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let orchestrator = ChaosOrchestrator::new(config())
            .with_random_source(Box::new(ScriptedRandom::constant(0.99)));
        let catalog = Arc::new(catalog(Sleeper { stubborn: false }, Duration::from_secs(1)));

        orchestrator
            .start(Arc::clone(&catalog), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(orchestrator.is_running().await);
        assert!(matches!(
            orchestrator.start(catalog, Duration::from_millis(50)).await,
            Err(HavocError::AlreadyRunning(_))
        ));

        orchestrator.stop().await.unwrap();
        assert!(!orchestrator.is_running().await);
    }
}
