//! PublishSink trait - allocator output interface
//!
//! Defines the abstract interface for publish destinations.

use crate::{Artifact, ContractError, DestinationId};

/// Artifact publishing trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(PublishSink: Send)]
pub trait LocalPublishSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Number of artifacts already delivered to `destination` in the current period
    ///
    /// # Errors
    /// Returns query error (should include context)
    async fn query_delivered_count(&self, destination: &DestinationId)
        -> Result<u32, ContractError>;

    /// Publish one artifact
    ///
    /// `is_final` marks the artifact that brings the destination to its target.
    async fn publish(
        &mut self,
        artifact: &Artifact,
        destination: &DestinationId,
        is_final: bool,
    ) -> Result<(), ContractError>;
}
