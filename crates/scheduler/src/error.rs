//! Scheduler error types

use thiserror::Error;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A worker task panicked or was aborted
    #[error("worker {worker_id} failed: {message}")]
    WorkerFailed { worker_id: usize, message: String },

    /// Configuration names no service for generation
    #[error("no generation service configured")]
    NoGenerationService,

    /// Dispatch error outside a task (from dispatcher)
    #[error("dispatch error: {0}")]
    Dispatch(#[from] dispatcher::DispatchError),
}

impl SchedulerError {
    pub fn worker_failed(worker_id: usize, message: impl Into<String>) -> Self {
        Self::WorkerFailed {
            worker_id,
            message: message.into(),
        }
    }
}
