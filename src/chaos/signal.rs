//! Cooperative stop signal shared between the orchestrator and a running executor.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why an executor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// The run reached its deadline
    DeadlineReached,
    /// Cancellation was requested before the deadline
    Cancelled,
}

/// Deadline plus cancellation token, polled by executors.
///
/// Cancellation takes precedence over the deadline when both hold.
#[derive(Debug, Clone)]
pub struct RunSignal {
    token: CancellationToken,
    deadline: Instant,
    poll_interval: Duration,
}

/// Executors must observe a stop within this bound.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

impl RunSignal {
    pub fn new(token: CancellationToken, deadline: Instant, poll_interval: Duration) -> Self {
        Self {
            token,
            deadline,
            poll_interval: poll_interval.min(MAX_POLL_INTERVAL),
        }
    }

    /// A fresh signal expiring `duration` from now.
    pub fn with_duration(duration: Duration) -> Self {
        Self::new(
            CancellationToken::new(),
            Instant::now() + duration,
            Duration::from_millis(250),
        )
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Non-blocking check, usable from worker threads.
    pub fn check(&self) -> Option<StopCause> {
        if self.token.is_cancelled() {
            Some(StopCause::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(StopCause::DeadlineReached)
        } else {
            None
        }
    }

    /// Sleep for at most one poll interval, waking early on cancellation.
    pub async fn pause(&self) -> Option<StopCause> {
        let step = self.poll_interval.min(self.remaining());
        if !step.is_zero() {
            tokio::select! {
                _ = self.token.cancelled() => {}
                _ = tokio::time::sleep(step) => {}
            }
        }
        self.check()
    }

    /// Sleep for `duration` unless the run stops first.
    ///
    /// Returns `None` when the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> Option<StopCause> {
        let until = Instant::now() + duration;
        loop {
            if let Some(cause) = self.check() {
                return Some(cause);
            }
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            let step = left.min(self.poll_interval).min(self.remaining());
            tokio::select! {
                _ = self.token.cancelled() => {}
                _ = tokio::time::sleep(step) => {}
            }
        }
    }

    /// Wait until the deadline passes or the run is cancelled.
    pub async fn hold(&self) -> StopCause {
        loop {
            if let Some(cause) = self.pause().await {
                return cause;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hold_until_deadline() {
        let signal = RunSignal::with_duration(Duration::from_millis(100));
        let started = Instant::now();
        assert_eq!(signal.hold().await, StopCause::DeadlineReached);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_cancel_wakes_hold() {
        let signal = RunSignal::with_duration(Duration::from_secs(30));
        let remote = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            remote.cancel();
        });

        let started = Instant::now();
        assert_eq!(signal.hold().await, StopCause::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let signal = RunSignal::with_duration(Duration::from_secs(5));
        assert_eq!(signal.sleep(Duration::from_millis(30)).await, None);
        assert_eq!(signal.check(), None);
    }

    #[test]
    fn test_poll_interval_is_capped() {
        let signal = RunSignal::new(
            CancellationToken::new(),
            Instant::now() + Duration::from_secs(10),
            Duration::from_secs(5),
        );
        assert_eq!(signal.poll_interval(), MAX_POLL_INTERVAL);
    }

    #[test]
    fn test_cancellation_wins_over_deadline() {
        let signal = RunSignal::with_duration(Duration::ZERO);
        assert_eq!(signal.check(), Some(StopCause::DeadlineReached));
        signal.cancel();
        assert_eq!(signal.check(), Some(StopCause::Cancelled));
    }
}
