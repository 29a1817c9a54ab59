//! Credential contracts
//!
//! Authentication schemes, the header a dispatcher attaches to an outbound
//! call, and the per-credential statistics snapshot exposed by a pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a secret is attached to an outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <secret>`
    #[default]
    Bearer,
    /// `x-api-key: <secret>`
    XApiKey,
    /// `X-Goog-Api-Key: <secret>`
    #[serde(alias = "api_key")]
    GoogApiKey,
}

impl AuthScheme {
    /// Build the header carrying `secret` under this scheme
    pub fn header_for(&self, secret: &str) -> AuthHeader {
        match self {
            Self::Bearer => AuthHeader {
                name: "Authorization".to_string(),
                value: format!("Bearer {secret}"),
            },
            Self::XApiKey => AuthHeader {
                name: "x-api-key".to_string(),
                value: secret.to_string(),
            },
            Self::GoogApiKey => AuthHeader {
                name: "X-Goog-Api-Key".to_string(),
                value: secret.to_string(),
            },
        }
    }
}

/// Authentication header attached to one attempt
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub name: String,
    pub value: String,
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHeader")
            .field("name", &self.name)
            .field("value", &mask_secret(&self.value))
            .finish()
    }
}

/// Credential health inside its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialHealth {
    Healthy,
    Quarantined,
}

/// Snapshot of one credential's statistics (for reporting)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialStats {
    /// Position in the configured secret list
    pub index: usize,
    /// Owning service
    pub service: String,
    /// Secret with everything but the tail masked
    pub masked: String,
    pub health: CredentialHealth,
    pub success_count: u64,
    /// Failures since the last full-quarantine reset
    pub failure_count: u64,
    /// Failures over the process lifetime
    pub total_failures: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// Mask a secret for logs, keeping the last four characters
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("...{tail}")
}
