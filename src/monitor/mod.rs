//! Health monitoring feed.
//!
//! Samples host resources and the target's health on its own cadence,
//! classifies application status, derives alerts and keeps a bounded history
//! that reporting code reads. The monitor knows nothing about which
//! experiments are running; it sees them only through their effect on the
//! host and the target.
//!
//! # Example
//!
//! ```rust,no_run
//! use havoc::monitor::{HealthMonitor, HttpProbe, MonitorConfig, SysinfoSampler};
//! use std::sync::Arc;
//!
//! # async fn example() -> havoc::error::Result<()> {
//! let config = MonitorConfig::default();
//! let probe = Arc::new(HttpProbe::new(&config.probe_url, config.probe_timeout)?);
//! let interval = config.sample_interval;
//!
//! let monitor = HealthMonitor::new(config, probe, Box::new(SysinfoSampler::new()));
//! monitor.start_monitoring(interval).await?;
//! // ...
//! monitor.stop_monitoring().await;
//! for snapshot in monitor.recent(5).await {
//!     println!("{} {}", snapshot.timestamp, snapshot.app_status);
//! }
//! # Ok(())
//! # }
//! ```

mod alerts;
mod config;
mod history;
mod probe;
mod snapshot;
mod status;
mod system;

pub use alerts::{alerts_for, Thresholds};
pub use config::MonitorConfig;
pub use history::{ExportFormat, SnapshotBuffer};
pub use probe::{HealthProbe, HookedProbe, HttpProbe, ProbeResponse};
pub use snapshot::{AlertEvent, AlertSeverity, AppStatus, HealthSnapshot, SystemMetrics};
pub use status::{Observation, StatusTracker};
pub use system::{SysinfoSampler, SystemSampler};

use crate::error::{HavocError, Result};
use crate::observability;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// Events
// ============================================================================

/// Events emitted by the health monitor
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Sample { snapshot: Box<HealthSnapshot> },
    Alert(AlertEvent),
    StatusChanged { from: AppStatus, to: AppStatus },
}

// ============================================================================
// Health Monitor
// ============================================================================

/// Periodic health sampler with a bounded snapshot history.
pub struct HealthMonitor {
    inner: Arc<Inner>,
    sample_loop: tokio::sync::Mutex<Option<SampleLoop>>,
}

struct SampleLoop {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    config: MonitorConfig,
    probe: Arc<dyn HealthProbe>,
    /// Shared with the blocking pool while a reading is taken
    sampler: Arc<parking_lot::Mutex<Box<dyn SystemSampler>>>,
    tracker: parking_lot::Mutex<StatusTracker>,
    history: RwLock<SnapshotBuffer>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl HealthMonitor {
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn HealthProbe>,
        sampler: Box<dyn SystemSampler>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1000);
        let tracker = StatusTracker::new(config.recovery_samples);
        let history = SnapshotBuffer::new(config.history_capacity);

        Self {
            inner: Arc::new(Inner {
                config,
                probe,
                sampler: Arc::new(parking_lot::Mutex::new(sampler)),
                tracker: parking_lot::Mutex::new(tracker),
                history: RwLock::new(history),
                event_tx,
            }),
            sample_loop: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Subscribe to monitor events
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Start periodic sampling.
    ///
    /// The first sample is taken immediately. A slow sample skips the ticks
    /// it overran rather than bunching them up.
    pub async fn start_monitoring(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(HavocError::InvalidArgument(
                "Sample interval must be positive".into(),
            ));
        }

        let mut slot = self.sample_loop.lock().await;
        if slot.as_ref().is_some_and(|l| !l.handle.is_finished()) {
            return Err(HavocError::AlreadyRunning("health monitor".into()));
        }

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = inner.sample().await;
                        debug!(status = %snapshot.app_status, alerts = snapshot.alerts.len(), "Health sample taken");
                    }
                }
            }
        });

        info!(interval = ?interval, target = %self.inner.config.probe_url, "Health monitoring started");
        *slot = Some(SampleLoop { shutdown, handle });
        Ok(())
    }

    /// Stop periodic sampling. Does nothing when not running.
    pub async fn stop_monitoring(&self) {
        if let Some(sample_loop) = self.sample_loop.lock().await.take() {
            sample_loop.shutdown.cancel();
            if let Err(e) = sample_loop.handle.await {
                error!(error = %e, "Health monitoring loop ended abnormally");
            }
            info!("Health monitoring stopped");
        }
    }

    /// Whether the sampling loop is running.
    pub async fn is_monitoring(&self) -> bool {
        self.sample_loop
            .lock()
            .await
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }

    /// Take one sample now and append it to the history.
    pub async fn sample(&self) -> HealthSnapshot {
        self.inner.sample().await
    }

    /// Current application status.
    pub fn status(&self) -> AppStatus {
        self.inner.tracker.lock().status()
    }

    pub async fn latest(&self) -> Option<HealthSnapshot> {
        self.inner.history.read().await.latest().cloned()
    }

    /// Up to `n` most recent snapshots, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<HealthSnapshot> {
        self.inner.history.read().await.recent(n)
    }

    /// Snapshots taken at or after `since`, oldest first.
    pub async fn since(&self, since: DateTime<Utc>) -> Vec<HealthSnapshot> {
        self.inner.history.read().await.since(since)
    }

    pub async fn history(&self) -> Vec<HealthSnapshot> {
        self.inner.history.read().await.all()
    }

    pub async fn export_history(&self, format: ExportFormat) -> Result<String> {
        self.inner.history.read().await.export(format)
    }

    /// Write the history to `path`, replacing any existing file.
    pub async fn export_to_file(&self, path: impl AsRef<Path>, format: ExportFormat) -> Result<()> {
        let path = path.as_ref();
        let content = self.export_history(format).await?;
        tokio::fs::write(path, content).await?;
        info!(path = %path.display(), ?format, "Health history exported");
        Ok(())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Ok(slot) = self.sample_loop.try_lock() {
            if let Some(sample_loop) = slot.as_ref() {
                sample_loop.shutdown.cancel();
            }
        }
    }
}

impl Inner {
    async fn sample(&self) -> HealthSnapshot {
        let sampler = Arc::clone(&self.sampler);
        let sampled = tokio::task::spawn_blocking(move || sampler.lock().sample())
            .await
            .map_err(|e| HavocError::Internal(format!("system sampler task failed: {}", e)))
            .and_then(|r| r);
        let system = match sampled {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(error = %e, "System sampling failed, recording zeroed metrics");
                SystemMetrics::default()
            }
        };

        let probed = self.probe_target().await;
        let observation = match &probed {
            Err(_) => Observation::Unreachable,
            Ok(response)
                if response.self_reported_degraded()
                    || self
                        .config
                        .thresholds
                        .response_degraded(Some(response.latency_ms), response.error_rate_pct) =>
            {
                Observation::Degraded
            }
            Ok(_) => Observation::Good,
        };

        let (status, transition) = {
            let mut tracker = self.tracker.lock();
            let transition = tracker.observe(observation);
            (tracker.status(), transition)
        };

        let mut snapshot = HealthSnapshot::new(system, status);
        match probed {
            Ok(response) => {
                snapshot.status_code = Some(response.status_code);
                snapshot.response_time_ms = Some(response.latency_ms);
                snapshot.error_rate_pct = response.error_rate_pct;
            }
            Err(e) => snapshot.probe_error = Some(e.to_string()),
        }
        snapshot.alerts = alerts_for(&snapshot, &self.config.thresholds);

        if let Some((from, to)) = transition {
            if to == AppStatus::Healthy {
                info!(from = %from, to = %to, "Application status changed");
            } else {
                warn!(from = %from, to = %to, error = ?snapshot.probe_error, "Application status changed");
            }
            let _ = self.event_tx.send(MonitorEvent::StatusChanged { from, to });
        }

        for alert in &snapshot.alerts {
            match alert.severity {
                AlertSeverity::Warning => warn!(
                    metric = %alert.metric,
                    value = alert.observed_value,
                    threshold = alert.threshold,
                    "{}", alert.message
                ),
                AlertSeverity::Critical => error!(
                    metric = %alert.metric,
                    value = alert.observed_value,
                    threshold = alert.threshold,
                    "{}", alert.message
                ),
            }
            observability::record_alert(alert.severity.as_str());
            let _ = self.event_tx.send(MonitorEvent::Alert(alert.clone()));
        }

        observability::update_health_metrics(
            snapshot.cpu_pct,
            snapshot.mem_pct,
            snapshot.disk_pct,
            snapshot.response_time_ms,
        );

        self.history.write().await.push(snapshot.clone());
        let _ = self.event_tx.send(MonitorEvent::Sample {
            snapshot: Box::new(snapshot.clone()),
        });
        snapshot
    }

    /// One bounded probe call. No retry; the next tick tries again.
    async fn probe_target(&self) -> Result<ProbeResponse> {
        let limit = self.config.probe_timeout;
        let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);

        match tokio::time::timeout(limit, self.probe.probe()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(HavocError::ProbeTimeout(_))) => Err(HavocError::ProbeTimeout(limit_ms)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(HavocError::ProbeTimeout(limit_ms)),
        }
    }
}
