//! Observability module for havoc.
//!
//! Provides logging setup, the Prometheus scrape endpoint, and the recording
//! helpers used by the orchestrator and the monitor. Recording is a no-op
//! until a metrics recorder is installed.

use crate::config::ObservabilityConfig;
use crate::error::{HavocError, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| HavocError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| HavocError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Run the Prometheus metrics server until `shutdown` is cancelled.
pub async fn run_metrics_server(
    config: ObservabilityConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| HavocError::Internal(format!("Failed to install metrics recorder: {}", e)))?;

    register_metrics();

    let app = axum::Router::new()
        .route(
            "/metrics",
            axum::routing::get(move || async move { handle.render() }),
        )
        .route("/health", axum::routing::get(|| async { "OK" }));

    let listener = TcpListener::bind(config.metrics_addr).await?;
    info!(addr = %config.metrics_addr, "Metrics server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| HavocError::Internal(format!("Metrics server failed: {}", e)))?;

    Ok(())
}

fn register_metrics() {
    counter!("havoc_experiments_triggered_total").absolute(0);
    counter!("havoc_experiments_finished_total").absolute(0);
    counter!("havoc_alerts_total").absolute(0);

    gauge!("havoc_cpu_percent").set(0.0);
    gauge!("havoc_memory_percent").set(0.0);
    gauge!("havoc_disk_percent").set(0.0);
    gauge!("havoc_response_time_ms").set(0.0);
}

/// Record an experiment trigger.
pub fn record_experiment_triggered(chaos_type: &str) {
    counter!("havoc_experiments_triggered_total", "type" => chaos_type.to_string()).increment(1);
}

/// Record an experiment reaching a terminal outcome.
pub fn record_experiment_finished(outcome: &str) {
    counter!("havoc_experiments_finished_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a raised alert.
pub fn record_alert(severity: &str) {
    counter!("havoc_alerts_total", "severity" => severity.to_string()).increment(1);
}

/// Update host and target gauges from one health sample.
pub fn update_health_metrics(cpu_pct: f64, mem_pct: f64, disk_pct: f64, response_time_ms: Option<f64>) {
    gauge!("havoc_cpu_percent").set(cpu_pct);
    gauge!("havoc_memory_percent").set(mem_pct);
    gauge!("havoc_disk_percent").set(disk_pct);
    if let Some(ms) = response_time_ms {
        gauge!("havoc_response_time_ms").set(ms);
    }
}
