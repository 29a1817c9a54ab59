//! LogSink - logs artifact summaries via tracing

use std::collections::HashMap;

use contracts::{Artifact, ContractError, DestinationId, PublishSink};
use tracing::{info, instrument};

/// Sink that logs artifacts and counts deliveries in memory
pub struct LogSink {
    name: String,
    delivered: HashMap<DestinationId, u32>,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delivered: HashMap::new(),
        }
    }

    /// Seed an already-delivered count
    pub fn with_delivered(mut self, destination: impl Into<DestinationId>, count: u32) -> Self {
        self.delivered.insert(destination.into(), count);
        self
    }

    pub fn delivered(&self, destination: &str) -> u32 {
        self.delivered.get(destination).copied().unwrap_or(0)
    }
}

impl PublishSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_delivered_count(
        &self,
        destination: &DestinationId,
    ) -> Result<u32, ContractError> {
        Ok(self.delivered(destination))
    }

    #[instrument(
        name = "log_sink_publish",
        skip(self, artifact),
        fields(sink = %self.name, item = %artifact.item_id)
    )]
    async fn publish(
        &mut self,
        artifact: &Artifact,
        destination: &DestinationId,
        is_final: bool,
    ) -> Result<(), ContractError> {
        let count = self.delivered.entry(destination.clone()).or_insert(0);
        *count += 1;
        info!(
            destination = %destination,
            title = %artifact.title,
            bytes = artifact.content.len(),
            translations = artifact.translations.len(),
            delivered = *count,
            is_final,
            "Artifact published"
        );
        Ok(())
    }
}
