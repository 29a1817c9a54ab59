//! Backlog loading
//!
//! Accepts either a bare JSON array of work items or an object with an
//! `items` array. Items flagged `used` are dropped here.

use contracts::{ContractError, WorkItem};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum BacklogFile {
    List(Vec<WorkItem>),
    Wrapped { items: Vec<WorkItem> },
}

/// Parse backlog JSON, keeping only unused items
pub fn parse_backlog(content: &str) -> Result<Vec<WorkItem>, ContractError> {
    let file: BacklogFile = serde_json::from_str(content)
        .map_err(|e| ContractError::backlog(format!("invalid backlog JSON: {e}")))?;

    let items = match file {
        BacklogFile::List(items) | BacklogFile::Wrapped { items } => items,
    };
    let total = items.len();
    let unused: Vec<WorkItem> = items.into_iter().filter(|item| !item.used).collect();

    tracing::debug!(total, unused = unused.len(), "backlog parsed");
    Ok(unused)
}

/// Read and parse a backlog file
pub fn load_backlog(path: &Path) -> Result<Vec<WorkItem>, ContractError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ContractError::backlog(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_backlog(&content)
}
