//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace: the
//! data model (credentials, work items, tasks, artifacts, allocations), the
//! error taxonomy, the collaborator traits (content engine, translation
//! engine, publish sink) and the run configuration.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Waits are expressed in "time-units" (`RetryConfig::time_unit_ms`, one
//!   second by default) so that backoff and cool-down scale together.
//! - Wall-clock timestamps (`last_used`, publish dates) are UTC.

mod credential;
mod engine;
mod error;
mod id;
mod request;
mod run_config;
mod sink;
mod work;

pub use credential::*;
pub use engine::*;
pub use error::*;
pub use id::{DestinationId, WorkItemId};
pub use request::*;
pub use run_config::*;
pub use sink::{LocalPublishSink, PublishSink};
pub use work::*;
