//! Exponential backoff: `min(cap, 2^attempt)` time-units

use std::time::Duration;

/// Backoff in time-units for a zero-based attempt index
pub fn backoff_units(attempt: u32, cap: u64) -> u64 {
    2u64.checked_pow(attempt).unwrap_or(u64::MAX).min(cap)
}

/// Backoff policy bound to a concrete time-unit
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    cap: u64,
    unit: Duration,
}

impl BackoffPolicy {
    pub fn new(cap: u64, unit: Duration) -> Self {
        Self { cap, unit }
    }

    pub fn from_config(config: &contracts::RetryConfig) -> Self {
        Self::new(config.backoff_cap, Duration::from_millis(config.time_unit_ms))
    }

    pub fn units(&self, attempt: u32) -> u64 {
        backoff_units(attempt, self.cap)
    }

    /// Wait before the attempt following `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let units = u32::try_from(self.units(attempt)).unwrap_or(u32::MAX);
        self.unit.saturating_mul(units)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(30, Duration::from_secs(1))
    }
}
