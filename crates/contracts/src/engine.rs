//! Content / translation engine traits - external collaborators
//!
//! Engines perform exactly one outbound call per invocation. Retries,
//! credential rotation and breaker checks belong to the dispatcher.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{AuthHeader, RequestSpec};

/// Classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Credential rejected (401/403); rotate immediately
    AuthFailure,
    /// Throttled (429); penalize credential and back off
    RateLimited,
    /// Network, server or malformed body; back off without penalty
    Transient,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFailure => "auth_failure",
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
        }
    }

    /// Whether the credential used for the attempt should be quarantined
    pub fn penalizes_credential(&self) -> bool {
        matches!(self, Self::AuthFailure | Self::RateLimited)
    }

    /// Whether the dispatcher sleeps before the next attempt
    pub fn backs_off(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single classified engine failure
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: FailureKind,
    pub message: String,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
}

impl EngineError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::AuthFailure,
            message: message.into(),
            status: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::RateLimited,
            message: message.into(),
            status: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
            status: None,
        }
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => FailureKind::AuthFailure,
            429 => FailureKind::RateLimited,
            _ => FailureKind::Transient,
        };
        Self {
            kind,
            message: message.into(),
            status: Some(status),
        }
    }
}

/// Content generation engine
///
/// All engine implementations must implement this trait.
#[trait_variant::make(ContentEngine: Send)]
pub trait LocalContentEngine {
    /// Engine name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Perform one outbound generation call authenticated with `auth`
    ///
    /// # Errors
    /// Returns a classified [`EngineError`]; never retries internally.
    async fn generate(&self, request: &RequestSpec, auth: &AuthHeader)
        -> Result<String, EngineError>;
}

/// Translation engine
///
/// Callers fall back to the source text when translation fails.
#[trait_variant::make(TranslationEngine: Send)]
pub trait LocalTranslationEngine {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            EngineError::from_status(401, "x").kind,
            FailureKind::AuthFailure
        );
        assert_eq!(
            EngineError::from_status(403, "x").kind,
            FailureKind::AuthFailure
        );
        assert_eq!(
            EngineError::from_status(429, "x").kind,
            FailureKind::RateLimited
        );
        assert_eq!(EngineError::from_status(500, "x").kind, FailureKind::Transient);
        assert_eq!(EngineError::from_status(400, "x").status, Some(400));
    }

    #[test]
    fn test_failure_kind_policy() {
        assert!(FailureKind::AuthFailure.penalizes_credential());
        assert!(!FailureKind::AuthFailure.backs_off());
        assert!(FailureKind::RateLimited.penalizes_credential());
        assert!(FailureKind::RateLimited.backs_off());
        assert!(!FailureKind::Transient.penalizes_credential());
        assert!(FailureKind::Transient.backs_off());
    }

    #[test]
    fn test_display() {
        let err = EngineError::rate_limited("slow down");
        assert_eq!(err.to_string(), "rate_limited: slow down");
    }
}
