//! Allocator error types

use contracts::{AttemptRecord, ContractError};
use scheduler::SchedulerError;
use thiserror::Error;

use crate::summary::RunSummary;

#[derive(Debug, Error)]
pub enum AllocatorError {
    /// Fatal for the run; delivered counts are frozen in `summary`
    #[error("run aborted: circuit breaker tripped after {} failed attempts", .history.len())]
    BreakerTripped {
        summary: Box<RunSummary>,
        history: Vec<AttemptRecord>,
    },

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("sink error: {0}")]
    Sink(#[from] ContractError),
}

impl AllocatorError {
    /// Frozen summary of an aborted run
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::BreakerTripped { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            Self::BreakerTripped { history, .. } => history,
            _ => &[],
        }
    }
}
