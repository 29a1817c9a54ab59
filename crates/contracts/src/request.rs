//! RequestSpec - one logical outbound call
//!
//! Prompt text is opaque here; building it is the caller's concern.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::FailureKind;

/// What the call is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    Generate,
    Translate { target_lang: String },
}

/// One logical outbound call, routed to a named service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Service (credential pool) name
    pub service: String,
    pub prompt: String,
    pub kind: RequestKind,
}

impl RequestSpec {
    pub fn generate(service: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            prompt: prompt.into(),
            kind: RequestKind::Generate,
        }
    }

    pub fn translate(
        service: impl Into<String>,
        text: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            prompt: text.into(),
            kind: RequestKind::Translate {
                target_lang: target_lang.into(),
            },
        }
    }
}

/// One failed attempt of a dispatch, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Zero-based attempt index
    pub attempt: u32,
    pub kind: FailureKind,
    pub message: String,
    /// Masked credential used for the attempt
    pub credential: String,
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt #{} [{}] via {}: {}",
            self.attempt + 1,
            self.kind,
            self.credential,
            self.message
        )
    }
}
