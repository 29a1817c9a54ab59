//! Run session: wires configuration into the dispatch stack.

mod orchestrator;
mod report;

pub use orchestrator::{EngineChoice, Session, SessionConfig};
pub use report::{SessionOutcome, SessionReport};
