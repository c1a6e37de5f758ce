//! Application status state machine with recovery hysteresis.

use super::snapshot::AppStatus;

/// What one probe said about the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Probe failed or timed out
    Unreachable,
    /// Probe answered with elevated response metrics
    Degraded,
    /// Probe answered within thresholds
    Good,
}

/// Tracks `app_status` across samples.
///
/// Failures take effect immediately. Returning to `Healthy` takes
/// `recovery_samples` consecutive good observations; a reachable target that
/// has not yet recovered reports `Degraded`.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    status: AppStatus,
    good_streak: u32,
    recovery_samples: u32,
}

impl StatusTracker {
    pub fn new(recovery_samples: u32) -> Self {
        Self {
            status: AppStatus::Healthy,
            good_streak: 0,
            recovery_samples: recovery_samples.max(1),
        }
    }

    pub fn status(&self) -> AppStatus {
        self.status
    }

    /// Apply one observation; returns `(from, to)` when the status changed.
    pub fn observe(&mut self, observation: Observation) -> Option<(AppStatus, AppStatus)> {
        let next = match observation {
            Observation::Unreachable => {
                self.good_streak = 0;
                AppStatus::Unreachable
            }
            Observation::Degraded => {
                self.good_streak = 0;
                AppStatus::Degraded
            }
            Observation::Good => {
                self.good_streak = self.good_streak.saturating_add(1);
                match self.status {
                    AppStatus::Healthy => AppStatus::Healthy,
                    _ if self.good_streak >= self.recovery_samples => AppStatus::Healthy,
                    _ => AppStatus::Degraded,
                }
            }
        };

        if next == self.status {
            return None;
        }
        let from = self.status;
        self.status = next;
        Some((from, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_spike_recovers_after_streak() {
        let mut tracker = StatusTracker::new(3);
        assert_eq!(
            tracker.observe(Observation::Degraded),
            Some((AppStatus::Healthy, AppStatus::Degraded))
        );
        assert_eq!(tracker.observe(Observation::Good), None);
        assert_eq!(tracker.observe(Observation::Good), None);
        assert_eq!(
            tracker.observe(Observation::Good),
            Some((AppStatus::Degraded, AppStatus::Healthy))
        );
    }

    #[test]
    fn test_bad_sample_resets_streak() {
        let mut tracker = StatusTracker::new(2);
        tracker.observe(Observation::Degraded);
        tracker.observe(Observation::Good);
        tracker.observe(Observation::Degraded);
        tracker.observe(Observation::Good);
        assert_eq!(tracker.status(), AppStatus::Degraded);
        tracker.observe(Observation::Good);
        assert_eq!(tracker.status(), AppStatus::Healthy);
    }

    #[test]
    fn test_unreachable_recovers_through_degraded() {
        let mut tracker = StatusTracker::new(3);
        assert_eq!(
            tracker.observe(Observation::Unreachable),
            Some((AppStatus::Healthy, AppStatus::Unreachable))
        );
        assert_eq!(
            tracker.observe(Observation::Good),
            Some((AppStatus::Unreachable, AppStatus::Degraded))
        );
        tracker.observe(Observation::Good);
        assert_eq!(
            tracker.observe(Observation::Good),
            Some((AppStatus::Degraded, AppStatus::Healthy))
        );
    }

    #[test]
    fn test_healthy_stays_quiet() {
        let mut tracker = StatusTracker::new(3);
        for _ in 0..5 {
            assert_eq!(tracker.observe(Observation::Good), None);
        }
    }
}
