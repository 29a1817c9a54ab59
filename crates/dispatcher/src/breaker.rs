//! CircuitBreaker - session-wide consecutive-failure budget
//!
//! Two states only: Armed and Tripped. Tripped is terminal for the run;
//! a new run builds a new breaker.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::DispatchError;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerState {
    Armed,
    Tripped,
}

#[derive(Debug)]
struct FailureBudget {
    consecutive_failures: u32,
    threshold: u32,
    tripped: bool,
}

impl FailureBudget {
    fn tripped_error(&self) -> DispatchError {
        DispatchError::BreakerTripped {
            consecutive_failures: self.consecutive_failures,
            threshold: self.threshold,
        }
    }
}

/// Snapshot of the breaker (for reporting)
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub threshold: u32,
}

/// Shared handle to the run's circuit breaker
///
/// Cheap to clone; every clone observes the same budget.
#[derive(Debug, Clone)]
pub struct BreakerHandle {
    inner: Arc<Mutex<FailureBudget>>,
}

impl BreakerHandle {
    /// Create an armed breaker tripping at `threshold` consecutive failures
    pub fn new(threshold: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FailureBudget {
                consecutive_failures: 0,
                threshold,
                tripped: false,
            })),
        }
    }

    /// Fail fast if the breaker has tripped
    pub fn check_or_abort(&self) -> Result<(), DispatchError> {
        let budget = self.inner.lock();
        if budget.tripped {
            return Err(budget.tripped_error());
        }
        Ok(())
    }

    /// Reset the counter; no effect once tripped
    pub fn record_success(&self) {
        let mut budget = self.inner.lock();
        if budget.tripped {
            return;
        }
        if budget.consecutive_failures > 0 {
            budget.consecutive_failures = 0;
            observability::record_breaker_reset();
        }
    }

    /// Consume one unit of the failure budget
    ///
    /// # Errors
    /// `BreakerTripped` once the counter reaches the threshold, and on every
    /// call after that.
    pub fn record_failure(&self) -> Result<(), DispatchError> {
        let mut budget = self.inner.lock();
        if budget.tripped {
            return Err(budget.tripped_error());
        }

        budget.consecutive_failures += 1;
        observability::record_breaker_failure(budget.consecutive_failures);

        if budget.consecutive_failures >= budget.threshold {
            budget.tripped = true;
            observability::record_breaker_trip();
            error!(
                consecutive_failures = budget.consecutive_failures,
                threshold = budget.threshold,
                "Circuit breaker tripped"
            );
            return Err(budget.tripped_error());
        }

        warn!(
            consecutive_failures = budget.consecutive_failures,
            threshold = budget.threshold,
            "Failure budget consumed"
        );
        Ok(())
    }

    pub fn is_tripped(&self) -> bool {
        self.inner.lock().tripped
    }

    pub fn state(&self) -> BreakerState {
        if self.is_tripped() {
            BreakerState::Tripped
        } else {
            BreakerState::Armed
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let budget = self.inner.lock();
        BreakerSnapshot {
            state: if budget.tripped {
                BreakerState::Tripped
            } else {
                BreakerState::Armed
            },
            consecutive_failures: budget.consecutive_failures,
            threshold: budget.threshold,
        }
    }
}
