//! Dispatch error types

use contracts::AttemptRecord;
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Session-wide failure budget exhausted; fatal for the run
    #[error("circuit breaker tripped after {consecutive_failures} consecutive failures (threshold {threshold})")]
    BreakerTripped {
        consecutive_failures: u32,
        threshold: u32,
    },

    /// Every attempt of one logical call failed
    #[error("service '{service}' exhausted {} attempts", .history.len())]
    RetriesExhausted {
        service: String,
        history: Vec<AttemptRecord>,
    },

    /// Pool holds no credentials at all
    #[error("credential pool for '{service}' is empty")]
    PoolExhausted { service: String },

    /// No pool registered under this name
    #[error("unknown service '{service}'")]
    UnknownService { service: String },
}

impl DispatchError {
    pub fn retries_exhausted(service: impl Into<String>, history: Vec<AttemptRecord>) -> Self {
        Self::RetriesExhausted {
            service: service.into(),
            history,
        }
    }

    pub fn pool_exhausted(service: impl Into<String>) -> Self {
        Self::PoolExhausted {
            service: service.into(),
        }
    }

    pub fn unknown_service(service: impl Into<String>) -> Self {
        Self::UnknownService {
            service: service.into(),
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BreakerTripped { .. })
    }

    /// Attempt history carried by the error (empty for non-exhaustion errors)
    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            Self::RetriesExhausted { history, .. } => history,
            _ => &[],
        }
    }
}
