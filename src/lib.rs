//! Havoc - a controlled failure injection harness.
//!
//! Havoc exercises a target service while probabilistically triggering
//! resource exhaustion and disruption experiments, and watches host and
//! application health the whole time on an independent cadence.
//!
//! # Features
//!
//! - **Chaos Orchestrator**: fixed-cadence, probability-driven scheduling of
//!   concurrent experiments, each bounded by a hard deadline.
//! - **Executors**: CPU, memory, network latency, service disruption, disk
//!   pressure and process hang, each releasing what it acquired on every exit
//!   path.
//! - **Health Monitor**: host metrics plus an HTTP health probe, status
//!   hysteresis, threshold alerts and a bounded snapshot history.
//! - **Reports**: outcome, alert and resource summaries for a session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Havoc                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Front end: CLI | Shutdown coordination | Run report        │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  Chaos Orchestrator          │  Health Monitor              │
//! │  catalog, registry, history  │  sampler, probe, alerts      │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  Fault hooks: latency | hang | disruption                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Observability: tracing | Prometheus metrics                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use havoc::config::HavocConfig;
//! use havoc::RunOptions;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> havoc::Result<()> {
//!     let config = HavocConfig::development();
//!     let options = RunOptions {
//!         duration: Some(Duration::from_secs(60)),
//!         ..Default::default()
//!     };
//!
//!     let report = havoc::run(config, options).await?;
//!     println!("{} experiments run", report.experiments_run);
//!     Ok(())
//! }
//! ```

pub mod chaos;
pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
pub mod observability;
pub mod report;
pub mod shutdown;

// Re-exports
pub use error::{HavocError, Result};

use chaos::{sample_definitions, ChaosOrchestrator, ExecutorSet, ExperimentCatalog};
use config::HavocConfig;
use monitor::{ExportFormat, HealthMonitor, HealthProbe, HookedProbe, HttpProbe, SysinfoSampler};
use report::RunReport;
use shutdown::{ShutdownCoordinator, SignalHandler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Snapshots summarized in the report's resource statistics.
const REPORT_WINDOW: usize = 10;

/// Session options that come from the command line rather than the config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this long; run until a signal when absent
    pub duration: Option<Duration>,
    /// Directory for the history, experiment log and report
    pub output: Option<PathBuf>,
    /// Suspend this process for service disruption experiments
    pub target_pid: Option<u32>,
}

/// Build the executors for a session.
fn build_executors(config: &HavocConfig, options: &RunOptions) -> Result<ExecutorSet> {
    match options.target_pid {
        #[cfg(unix)]
        Some(pid) => {
            let service = Arc::new(chaos::ProcessSignalService::new(pid)?);
            Ok(ExecutorSet::with_parts(
                &config.orchestrator,
                chaos::FaultHooks::new(),
                chaos::ResourceLedger::new(),
                service,
            ))
        }
        #[cfg(not(unix))]
        Some(_) => Err(HavocError::InvalidArgument(
            "Process suspension is only supported on unix".into(),
        )),
        None => Ok(ExecutorSet::standard(&config.orchestrator)),
    }
}

/// Run one havoc session until a signal or the configured duration.
///
/// Starts the monitor and the orchestrator, then on shutdown stops the
/// orchestrator first so its final runs are still observed, then the
/// monitor.
pub async fn run(config: HavocConfig, options: RunOptions) -> Result<RunReport> {
    config.validate()?;

    let executors = build_executors(&config, &options)?;
    let definitions = if config.experiments.is_empty() {
        info!("No experiments configured, using the sample catalog");
        sample_definitions()
    } else {
        config.experiments.clone()
    };
    let catalog = Arc::new(ExperimentCatalog::build(definitions, &executors)?);

    let http: Arc<dyn HealthProbe> = Arc::new(HttpProbe::new(
        &config.monitor.probe_url,
        config.monitor.probe_timeout,
    )?);
    let probe = Arc::new(HookedProbe::new(executors.hooks(), http));
    let monitor = HealthMonitor::new(
        config.monitor.clone(),
        probe,
        Box::new(SysinfoSampler::new()),
    );
    let orchestrator = ChaosOrchestrator::new(config.orchestrator.clone());

    let coordinator = ShutdownCoordinator::new();

    let metrics_handle = if config.observability.metrics_enabled {
        let obs_config = config.observability.clone();
        let token = coordinator.token();
        Some(tokio::spawn(async move {
            if let Err(e) = observability::run_metrics_server(obs_config, token).await {
                error!(error = %e, "Metrics server error");
            }
        }))
    } else {
        None
    };

    let signal_handler = tokio::spawn(SignalHandler::new(coordinator.clone()).run());
    if let Some(duration) = options.duration {
        coordinator.shutdown_after(duration);
    }

    monitor
        .start_monitoring(config.monitor.sample_interval)
        .await?;
    orchestrator
        .start(Arc::clone(&catalog), config.orchestrator.tick_interval)
        .await?;
    info!(experiments = catalog.len(), target = %config.monitor.probe_url, "Havoc session running");

    let reason = coordinator.wait_for_shutdown().await;
    info!(reason = reason.as_str(), "Stopping havoc session");

    let summary = orchestrator.stop().await?;
    monitor.stop_monitoring().await;
    info!(drained = summary.drained, forced = summary.forced, "Experiments stopped");

    let leftover = executors.ledger().snapshot();
    if !leftover.is_clean() {
        warn!(?leftover, "Resources still held after shutdown");
    }

    let runs = orchestrator.history().await;
    let snapshots = monitor.history().await;
    let report = RunReport::build(&runs, &snapshots, REPORT_WINDOW);

    if let Some(dir) = &options.output {
        tokio::fs::create_dir_all(dir).await?;
        monitor
            .export_to_file(dir.join("health_history.json"), ExportFormat::Json)
            .await?;
        tokio::fs::write(
            dir.join("experiments.json"),
            serde_json::to_string_pretty(&runs)?,
        )
        .await?;
        tokio::fs::write(dir.join("report.json"), serde_json::to_string_pretty(&report)?).await?;
        info!(dir = %dir.display(), "Session output written");
    }

    signal_handler.abort();
    if let Some(handle) = metrics_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Metrics server task ended abnormally");
        }
    }

    info!("Havoc session complete");
    Ok(report)
}
