//! Task and batch results

use std::time::Duration;

use contracts::{Artifact, AttemptRecord, Task, TaskId, TaskState};
use dispatcher::DispatchError;

/// Terminal outcome of one task
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded(Artifact),
    Failed {
        error: DispatchError,
        /// Attempt history of the failing dispatch
        history: Vec<AttemptRecord>,
    },
}

/// Result of one executed task
#[derive(Debug)]
pub struct TaskResult {
    pub task: Task,
    pub outcome: TaskOutcome,
    pub duration: Duration,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Succeeded(_))
    }

    /// Whether this result carries the fatal breaker signal
    pub fn is_breaker_tripped(&self) -> bool {
        matches!(
            self.outcome,
            TaskOutcome::Failed {
                error: DispatchError::BreakerTripped { .. },
                ..
            }
        )
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match &self.outcome {
            TaskOutcome::Succeeded(artifact) => Some(artifact),
            TaskOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&DispatchError> {
        match &self.outcome {
            TaskOutcome::Succeeded(_) => None,
            TaskOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn history(&self) -> &[AttemptRecord] {
        match &self.outcome {
            TaskOutcome::Succeeded(_) => &[],
            TaskOutcome::Failed { history, .. } => history,
        }
    }
}

/// Outcome of one sub-batch
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Completed tasks, in completion order
    pub results: Vec<TaskResult>,
    /// Tasks never started because of a trip
    pub cancelled: Vec<Task>,
    /// Breaker tripped during (or before) this batch
    pub tripped: bool,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }

    pub fn cancelled_ids(&self) -> Vec<TaskId> {
        self.cancelled.iter().map(|t| t.id).collect()
    }

    /// Attempt history of every failed task that consumed failure budget
    pub fn trip_history(&self) -> Vec<AttemptRecord> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .flat_map(|r| r.history().iter().cloned())
            .collect()
    }

    pub(crate) fn cancel(&mut self, mut task: Task) {
        task.state = TaskState::Cancelled;
        self.cancelled.push(task);
    }
}
