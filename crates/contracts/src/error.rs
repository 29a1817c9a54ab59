//! Layered error definitions
//!
//! Categorized by source: config / publish / general. Dispatch-time failures
//! (auth, rate limit, transient) live in [`crate::EngineError`].

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration contradicts itself or violates a range rule
    #[error("config invalid at '{field}': {message}")]
    ConfigInvalid { field: String, message: String },

    // ===== Publish Errors =====
    /// Publish sink rejected an artifact
    #[error("sink '{sink_name}' publish error for '{item_id}': {message}")]
    Publish {
        sink_name: String,
        item_id: String,
        message: String,
    },

    /// Delivered-count query failed
    #[error("sink '{sink_name}' query error for destination '{destination}': {message}")]
    DeliveredQuery {
        sink_name: String,
        destination: String,
        message: String,
    },

    // ===== Backlog Errors =====
    /// Backlog could not be read or decoded
    #[error("backlog error: {message}")]
    Backlog { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration invalid error
    pub fn config_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create publish error
    pub fn publish(
        sink_name: impl Into<String>,
        item_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Publish {
            sink_name: sink_name.into(),
            item_id: item_id.into(),
            message: message.into(),
        }
    }

    /// Create delivered-count query error
    pub fn delivered_query(
        sink_name: impl Into<String>,
        destination: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DeliveredQuery {
            sink_name: sink_name.into(),
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Create backlog error
    pub fn backlog(message: impl Into<String>) -> Self {
        Self::Backlog {
            message: message.into(),
        }
    }

    /// Whether this error is a startup configuration failure
    pub fn is_config(&self) -> bool {
        matches!(self, Self::ConfigParse { .. } | Self::ConfigInvalid { .. })
    }
}
