//! Experiment runs and their outcomes.

use super::ledger::LedgerSnapshot;
use super::types::{ChaosType, ExperimentDefinition};
use crate::error::HavocError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Terminal result of an experiment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Ran to its deadline. `shortfall` records a stress target that could
    /// not be fully reached.
    Completed { shortfall: Option<String> },
    /// Stopped early by cancellation or forced shutdown
    Aborted { reason: String },
    /// The executor returned an error or panicked
    Failed { reason: String },
}

impl RunOutcome {
    pub fn completed() -> Self {
        RunOutcome::Completed { shortfall: None }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        RunOutcome::Aborted {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        RunOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::Aborted { .. } => "aborted",
            RunOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RunOutcome::Aborted { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

/// Executor errors fail the run; a forced abort aborts it.
impl From<HavocError> for RunOutcome {
    fn from(err: HavocError) -> Self {
        match err {
            HavocError::ForcedAbort(reason) => RunOutcome::Aborted { reason },
            other => RunOutcome::failed(other.to_string()),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed { shortfall: None } => write!(f, "completed"),
            RunOutcome::Completed {
                shortfall: Some(s),
            } => write!(f, "completed (shortfall: {})", s),
            RunOutcome::Aborted { reason } => write!(f, "aborted ({})", reason),
            RunOutcome::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Finished,
}

/// One triggered execution of an [`ExperimentDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRun {
    /// Unique run ID
    pub id: String,
    /// Definition this run was created from
    pub definition: Arc<ExperimentDefinition>,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time, set once the run is terminal
    pub end_time: Option<DateTime<Utc>>,
    /// Terminal outcome, set together with `end_time`
    pub outcome: Option<RunOutcome>,
}

impl ExperimentRun {
    pub(crate) fn start(definition: Arc<ExperimentDefinition>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            definition,
            start_time: Utc::now(),
            end_time: None,
            outcome: None,
        }
    }

    pub(crate) fn finish(&mut self, outcome: RunOutcome) {
        self.end_time = Some(Utc::now());
        self.outcome = Some(outcome);
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn chaos_type(&self) -> ChaosType {
        self.definition.chaos_type
    }

    pub fn status(&self) -> RunStatus {
        if self.outcome.is_some() {
            RunStatus::Finished
        } else {
            RunStatus::Running
        }
    }

    /// Wall-clock length of a finished run.
    pub fn elapsed(&self) -> Option<Duration> {
        self.end_time
            .and_then(|end| (end - self.start_time).to_std().ok())
    }
}

/// Read-only view of a running experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRunSnapshot {
    pub run_id: String,
    pub name: String,
    pub chaos_type: ChaosType,
    pub started_at: DateTime<Utc>,
    /// Time since the run started
    pub elapsed: Duration,
    /// Time left until the run's deadline
    pub remaining: Duration,
    /// Whether cancellation has been requested
    pub cancelling: bool,
    /// Resources held by all running experiments when the view was taken
    pub resources: LedgerSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> Arc<ExperimentDefinition> {
        Arc::new(
            ExperimentDefinition::builder()
                .name("hang")
                .chaos_type(ChaosType::ProcessHang)
                .duration(Duration::from_secs(1))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = ExperimentRun::start(definition());
        assert_eq!(run.status(), RunStatus::Running);
        assert!(run.elapsed().is_none());

        run.finish(RunOutcome::completed());
        assert_eq!(run.status(), RunStatus::Finished);
        assert!(run.elapsed().is_some());
        assert_eq!(run.name(), "hang");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RunOutcome::completed().to_string(), "completed");
        assert_eq!(
            RunOutcome::aborted("forced shutdown").to_string(),
            "aborted (forced shutdown)"
        );
        assert!(RunOutcome::failed("boom").is_failed());
    }

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(
            RunOutcome::from(HavocError::ForcedAbort("forced shutdown".into())),
            RunOutcome::aborted("forced shutdown")
        );
        assert_eq!(
            RunOutcome::from(HavocError::ExecutorFault("boom".into())),
            RunOutcome::failed("Executor fault: boom")
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(RunOutcome::aborted("stopped")).unwrap();
        assert_eq!(json["outcome"], "aborted");
        assert_eq!(json["reason"], "stopped");
    }
}
