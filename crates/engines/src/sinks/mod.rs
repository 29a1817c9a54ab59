//! Sink implementations
//!
//! Contains DirectorySink and LogSink, plus the config-selected wrapper.

mod directory;
mod log;

pub use self::directory::{DirectorySink, DEPLOY_MARKER};
pub use self::log::LogSink;

use contracts::{Artifact, ContractError, DestinationId, PublishConfig, PublishKind, PublishSink};

/// Sink chosen by `[publish]`
pub enum ConfiguredSink {
    Directory(DirectorySink),
    Log(LogSink),
}

impl ConfiguredSink {
    /// # Errors
    /// `ConfigInvalid` when a directory sink has no root, `Io` when the
    /// root cannot be created.
    pub fn from_config(config: &PublishConfig) -> Result<Self, ContractError> {
        match config.kind {
            PublishKind::Log => Ok(Self::Log(LogSink::new("log"))),
            PublishKind::Directory => {
                let root = config.root.as_ref().ok_or_else(|| {
                    ContractError::config_invalid("publish.root", "required for directory sink")
                })?;
                Ok(Self::Directory(DirectorySink::new("directory", root)?))
            }
        }
    }
}

impl PublishSink for ConfiguredSink {
    fn name(&self) -> &str {
        match self {
            Self::Directory(sink) => sink.name(),
            Self::Log(sink) => sink.name(),
        }
    }

    async fn query_delivered_count(
        &self,
        destination: &DestinationId,
    ) -> Result<u32, ContractError> {
        match self {
            Self::Directory(sink) => sink.query_delivered_count(destination).await,
            Self::Log(sink) => sink.query_delivered_count(destination).await,
        }
    }

    async fn publish(
        &mut self,
        artifact: &Artifact,
        destination: &DestinationId,
        is_final: bool,
    ) -> Result<(), ContractError> {
        match self {
            Self::Directory(sink) => sink.publish(artifact, destination, is_final).await,
            Self::Log(sink) => sink.publish(artifact, destination, is_final).await,
        }
    }
}
