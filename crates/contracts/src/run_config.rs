//! RunConfig - configuration contract shared by the loader, the engines and the CLI
//!
//! Every section has serde defaults so a minimal file only needs
//! `[[services]]` and `[allocation]`. Field ranges are declared with
//! `validator`; cross-field rules live in `config_loader`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::{AuthScheme, DestinationId};

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    #[serde(default)]
    #[validate(nested)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    #[serde(default)]
    #[validate(nested)]
    pub pool: PoolConfig,

    #[serde(default)]
    #[validate(nested)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub allocation: AllocationConfig,

    /// External services, one credential pool each
    #[serde(default)]
    #[validate(nested)]
    pub services: Vec<ServiceConfig>,

    /// Service used for generation; first service when absent
    #[serde(default)]
    pub default_service: Option<String>,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

impl RunConfig {
    /// Name of the service used for content generation
    pub fn generation_service(&self) -> Option<&str> {
        self.default_service
            .as_deref()
            .or_else(|| self.services.first().map(|s| s.name.as_str()))
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Target for one destination (override or run-wide default)
    pub fn target_for(&self, destination: &DestinationConfig) -> u32 {
        destination
            .target
            .unwrap_or(self.allocation.per_destination_target)
    }

    /// Length of one time-unit
    pub fn time_unit(&self) -> Duration {
        Duration::from_millis(self.retry.time_unit_ms)
    }

    /// Pool cool-down as a duration
    pub fn cooldown(&self) -> Duration {
        self.time_unit()
            .saturating_mul(self.pool.cooldown_units)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker
    #[validate(range(min = 1))]
    pub threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { threshold: 5 }
    }
}

/// Retry / backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per logical call
    #[validate(range(min = 1))]
    pub max_retries: u32,
    /// Backoff cap in time-units
    #[validate(range(min = 1))]
    pub backoff_cap: u64,
    /// Milliseconds per time-unit
    #[validate(range(min = 1))]
    pub time_unit_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_cap: 30,
            time_unit_ms: 1000,
        }
    }
}

/// Credential pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PoolConfig {
    /// Cool-down after a full-quarantine reset, in time-units
    pub cooldown_units: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { cooldown_units: 30 }
    }
}

/// Batch scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Concurrent workers per sub-batch
    #[validate(range(min = 1))]
    pub concurrency: usize,
    /// Maximum tasks per sub-batch
    #[validate(range(min = 1))]
    pub batch_size: usize,
    /// Pause between consecutive sub-batches
    pub batch_pacing_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 4,
            batch_pacing_ms: 2000,
        }
    }
}

impl SchedulerConfig {
    pub fn batch_pacing(&self) -> Duration {
        Duration::from_millis(self.batch_pacing_ms)
    }
}

/// Quota allocation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AllocationConfig {
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    /// Default per-run target
    #[serde(default)]
    pub per_destination_target: u32,
    /// Fixed RNG seed for reproducible allocation
    #[serde(default)]
    pub seed: Option<u64>,
    /// Only the best-ranked N backlog items are eligible
    #[serde(default)]
    #[validate(range(min = 1))]
    pub priority_window: Option<usize>,
}

/// One publish destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub id: DestinationId,
    /// Overrides `per_destination_target`
    #[serde(default)]
    pub target: Option<u32>,
    /// Overrides `generation.primary_language`
    #[serde(default)]
    pub primary_language: Option<String>,
}

/// Wire format of an external service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    #[default]
    #[serde(alias = "openai-compatible")]
    OpenAi,
    Claude,
    Gemini,
}

/// External service with its credential list
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub format: ApiFormat,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub auth: AuthScheme,
    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// Extra static headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Inline secrets
    #[serde(default)]
    pub keys: Vec<String>,
    /// Environment variable holding comma-separated secrets
    #[serde(default)]
    pub keys_env: Option<String>,
    #[serde(default)]
    pub sampling: SamplingConfig,
}

fn default_timeout_secs() -> u64 {
    60
}

/// Sampling parameters forwarded to the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            max_tokens: 1500,
            top_p: 0.95,
        }
    }
}

/// Artifact generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub primary_language: String,
    /// Additional languages translated from the primary content
    pub languages: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            primary_language: "en".to_string(),
            languages: Vec::new(),
        }
    }
}

/// Publish sink kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishKind {
    Directory,
    #[default]
    Log,
}

/// Publish sink settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub kind: PublishKind,
    /// Root directory for the directory sink
    #[serde(default)]
    pub root: Option<PathBuf>,
}
