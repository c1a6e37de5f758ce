//! Fault hooks: injection points on the path to the target service.
//!
//! Anything that calls the target (the health probe, a load generator) goes
//! through [`FaultHooks::before_call`]. Executors install hooks and get back a
//! [`HookGuard`] that removes the hook when dropped, on every exit path.

use crate::error::{HavocError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookKind {
    Latency(Duration),
    Hang,
    Disruption,
}

/// Shared fault injection points.
#[derive(Debug)]
pub struct FaultHooks {
    installed: Mutex<HashMap<u64, HookKind>>,
    next_id: AtomicU64,
    /// Bumped on every change so hung callers re-check.
    version: watch::Sender<u64>,
}

impl Default for FaultHooks {
    fn default() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            installed: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            version,
        }
    }
}

impl FaultHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn install(self: &Arc<Self>, kind: HookKind) -> HookGuard {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.installed.lock().insert(id, kind);
        self.version.send_modify(|v| *v += 1);
        debug!(hook_id = id, ?kind, "Fault hook installed");
        HookGuard {
            hooks: Arc::clone(self),
            id,
        }
    }

    fn remove(&self, id: u64) {
        if let Some(kind) = self.installed.lock().remove(&id) {
            debug!(hook_id = id, ?kind, "Fault hook removed");
        }
        self.version.send_modify(|v| *v += 1);
    }

    /// Delay every call to the target by `delay`.
    pub fn install_latency(self: &Arc<Self>, delay: Duration) -> HookGuard {
        self.install(HookKind::Latency(delay))
    }

    /// Block every call to the target until the hook is removed.
    pub fn install_hang(self: &Arc<Self>) -> HookGuard {
        self.install(HookKind::Hang)
    }

    /// Refuse every call to the target until the hook is removed.
    pub fn install_disruption(self: &Arc<Self>) -> HookGuard {
        self.install(HookKind::Disruption)
    }

    /// Largest latency currently injected.
    pub fn injected_latency(&self) -> Duration {
        self.installed
            .lock()
            .values()
            .filter_map(|kind| match kind {
                HookKind::Latency(d) => Some(*d),
                _ => None,
            })
            .max()
            .unwrap_or_default()
    }

    pub fn is_hung(&self) -> bool {
        self.installed
            .lock()
            .values()
            .any(|kind| matches!(kind, HookKind::Hang))
    }

    pub fn is_disrupted(&self) -> bool {
        self.installed
            .lock()
            .values()
            .any(|kind| matches!(kind, HookKind::Disruption))
    }

    pub fn installed_count(&self) -> usize {
        self.installed.lock().len()
    }

    /// Apply the installed faults to one call to the target.
    ///
    /// Waits while a hang is installed, fails while the target is disrupted,
    /// then sleeps for the injected latency. Callers bound the whole call
    /// with their own timeout.
    pub async fn before_call(&self) -> Result<()> {
        loop {
            let mut changes = self.version.subscribe();
            if !self.is_hung() {
                break;
            }
            if changes.changed().await.is_err() {
                break;
            }
        }

        if self.is_disrupted() {
            return Err(HavocError::ProbeUnreachable(
                "target service is disrupted".into(),
            ));
        }

        let delay = self.injected_latency();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// Removes its hook when dropped.
#[derive(Debug)]
pub struct HookGuard {
    hooks: Arc<FaultHooks>,
    id: u64,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        self.hooks.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_latency_hook_applies_and_clears() {
        let hooks = FaultHooks::new();
        let guard = hooks.install_latency(Duration::from_millis(40));
        assert_eq!(hooks.injected_latency(), Duration::from_millis(40));

        let started = Instant::now();
        hooks.before_call().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));

        drop(guard);
        assert_eq!(hooks.injected_latency(), Duration::ZERO);
        assert_eq!(hooks.installed_count(), 0);
    }

    #[tokio::test]
    async fn test_largest_latency_wins() {
        let hooks = FaultHooks::new();
        let _a = hooks.install_latency(Duration::from_millis(10));
        let _b = hooks.install_latency(Duration::from_millis(30));
        assert_eq!(hooks.injected_latency(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_disruption_refuses_calls() {
        let hooks = FaultHooks::new();
        let guard = hooks.install_disruption();
        let err = hooks.before_call().await.unwrap_err();
        assert!(err.is_probe_failure());

        drop(guard);
        assert!(hooks.before_call().await.is_ok());
    }

    #[tokio::test]
    async fn test_hang_releases_waiters() {
        let hooks = FaultHooks::new();
        let guard = hooks.install_hang();

        let waiter = {
            let hooks = Arc::clone(&hooks);
            tokio::spawn(async move { hooks.before_call().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("hung call released")
            .unwrap();
        assert!(result.is_ok());
    }
}
