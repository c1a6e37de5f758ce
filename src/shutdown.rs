//! Shutdown coordination for a havoc session.
//!
//! A session ends on Ctrl-C, SIGTERM, or when its configured duration runs
//! out. Whichever comes first trips the [`ShutdownCoordinator`]; the front
//! end then stops the orchestrator and the monitor in order.

use crate::error::{HavocError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Why the session is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    DurationElapsed,
    Requested,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::Signal => "signal",
            ShutdownReason::DurationElapsed => "duration elapsed",
            ShutdownReason::Requested => "requested",
        }
    }
}

/// Shared shutdown trigger.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    reason_tx: Arc<watch::Sender<Option<ShutdownReason>>>,
    reason_rx: watch::Receiver<Option<ShutdownReason>>,
    is_shutting_down: Arc<AtomicBool>,
    /// Cancelled on shutdown, for tasks that take a token
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (reason_tx, reason_rx) = watch::channel(None);
        Self {
            reason_tx: Arc::new(reason_tx),
            reason_rx,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            token: CancellationToken::new(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// The first reason given, once shutdown has begun.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason_rx.borrow()
    }

    /// Token cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Begin shutdown. Later calls keep the first reason.
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(reason = reason.as_str(), "Initiating shutdown");
            let _ = self.reason_tx.send(Some(reason));
            self.token.cancel();
        }
    }

    /// Resolve once shutdown has begun, returning its reason.
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        let mut rx = self.reason_rx.clone();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return ShutdownReason::Requested;
            }
        }
    }

    /// Trip shutdown after `duration`, unless something else does first.
    pub fn shutdown_after(&self, duration: Duration) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    coordinator.shutdown(ShutdownReason::DurationElapsed);
                }
                _ = coordinator.token.cancelled() => {}
            }
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates OS signals into a shutdown.
pub struct SignalHandler {
    coordinator: ShutdownCoordinator,
}

impl SignalHandler {
    pub fn new(coordinator: ShutdownCoordinator) -> Self {
        Self { coordinator }
    }

    /// Wait for SIGTERM, SIGINT or SIGQUIT, or for shutdown to begin some
    /// other way.
    #[cfg(unix)]
    pub async fn run(self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| {
                HavocError::Internal(format!("Failed to install {} handler: {}", name, e))
            })
        };
        let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
        let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;
        let mut sigquit = install(SignalKind::quit(), "SIGQUIT")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigquit.recv() => info!("Received SIGQUIT"),
            _ = self.coordinator.token.cancelled() => return Ok(()),
        }

        self.coordinator.shutdown(ShutdownReason::Signal);
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn run(self) -> Result<()> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| HavocError::Internal(format!("Failed to install Ctrl+C handler: {}", e)))?;
                info!("Received Ctrl+C");
            }
            _ = self.coordinator.token.cancelled() => return Ok(()),
        }

        self.coordinator.shutdown(ShutdownReason::Signal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_reason_wins() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());
        assert_eq!(coordinator.reason(), None);

        coordinator.shutdown(ShutdownReason::Signal);
        coordinator.shutdown(ShutdownReason::DurationElapsed);

        assert!(coordinator.is_shutting_down());
        assert_eq!(coordinator.reason(), Some(ShutdownReason::Signal));
        assert_eq!(coordinator.wait_for_shutdown().await, ShutdownReason::Signal);
        assert!(coordinator.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_after_duration() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown_after(Duration::from_secs(30));

        let reason = coordinator.wait_for_shutdown().await;
        assert_eq!(reason, ShutdownReason::DurationElapsed);
    }

    #[tokio::test]
    async fn test_signal_handler_returns_on_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let handler = tokio::spawn(SignalHandler::new(coordinator.clone()).run());

        coordinator.shutdown(ShutdownReason::Requested);
        let result = tokio::time::timeout(Duration::from_secs(1), handler).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
