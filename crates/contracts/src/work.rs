//! Work model: items pulled from the backlog, tasks, artifacts, allocations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{DestinationId, WorkItemId};

/// One entry of the upstream backlog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub title: String,
    /// Priority rank; lower sorts first
    #[serde(default)]
    pub rank: i64,
    /// Prompt input handed to the content engine untouched
    #[serde(default)]
    pub payload: String,
    /// Already consumed by a previous run
    #[serde(default)]
    pub used: bool,
}

impl WorkItem {
    pub fn new(id: impl Into<WorkItemId>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            payload: title.clone(),
            title,
            rank: 0,
            used: false,
        }
    }

    pub fn with_rank(mut self, rank: i64) -> Self {
        self.rank = rank;
        self
    }
}

/// Task identifier, unique within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never started because the breaker tripped
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// One unit of generation work bound to a destination
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub item: WorkItem,
    pub destination: DestinationId,
    pub state: TaskState,
}

impl Task {
    pub fn new(id: TaskId, item: WorkItem, destination: DestinationId) -> Self {
        Self {
            id,
            item,
            destination,
            state: TaskState::Pending,
        }
    }
}

/// Generated content ready for publishing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub item_id: WorkItemId,
    pub title: String,
    pub primary_language: String,
    pub content: String,
    /// Language code -> translated content
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
}

/// Permanent work item -> destination binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub item: WorkItemId,
    pub destination: DestinationId,
    pub task: TaskId,
}
