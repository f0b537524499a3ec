//! Per-stage execution reports.

use std::time::Duration;

use super::stage::Stage;

/// Final state of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Worker exited 0 and was removed.
    Succeeded,
    /// Worker exited non-zero or could not be awaited; it is retained for inspection.
    Failed {
        exit_code: Option<i64>,
        reason: String,
    },
    /// Worker was launched but not awaited because the stage was interrupted.
    Abandoned,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Succeeded => write!(f, "succeeded"),
            WorkerStatus::Failed { reason, .. } => write!(f, "failed: {}", reason),
            WorkerStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Result of one worker in a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// Component the worker acted on.
    pub component: String,
    /// Worker name.
    pub worker: String,
    /// Final status.
    pub status: WorkerStatus,
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        self.status == WorkerStatus::Succeeded
    }
}

/// Outcome of running one stage over every generated component.
#[derive(Debug, Clone)]
pub struct StageReport {
    /// Stage that ran.
    pub stage: Stage,
    /// One outcome per launched worker, in wait order.
    pub outcomes: Vec<WorkerOutcome>,
    /// Time spent building the worker image, when it had to be built.
    pub image_build_time: Option<Duration>,
    /// Wall time of the whole stage, image bootstrap included.
    pub components_time: Duration,
    /// Whether the stage was interrupted.
    pub cancelled: bool,
}

impl StageReport {
    /// Number of workers that succeeded.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of workers that failed.
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, WorkerStatus::Failed { .. }))
            .count()
    }

    /// Workers left in the substrate for inspection.
    pub fn retained_workers(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.worker.as_str())
            .collect()
    }

    /// Returns true when every worker succeeded and the stage was not interrupted.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.outcomes.iter().all(WorkerOutcome::is_success)
    }
}
