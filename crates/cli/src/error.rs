//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Backlog file not found
    #[error("Backlog file not found: {path}")]
    BacklogNotFound { path: String },

    /// Run stopped by the circuit breaker
    #[error("Run aborted by circuit breaker after {attempts} failed attempts")]
    RunAborted { attempts: usize },

    /// Run interrupted by a shutdown signal
    #[error("Run interrupted by shutdown signal")]
    Interrupted,
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn backlog_not_found(path: impl Into<String>) -> Self {
        Self::BacklogNotFound { path: path.into() }
    }

    pub fn run_aborted(attempts: usize) -> Self {
        Self::RunAborted { attempts }
    }
}
