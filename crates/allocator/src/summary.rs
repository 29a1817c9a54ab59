//! Run summary

use std::fmt;
use std::time::Duration;

use contracts::{Allocation, DestinationId, WorkItemId};
use observability::RunStatsSummary;
use serde::Serialize;

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every destination reached its target
    Complete,
    /// The stream ran dry first
    Partial,
    /// Breaker tripped; counts are frozen
    Aborted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Per-destination progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationSummary {
    pub id: DestinationId,
    /// Delivered count observed before the run
    pub initial: u32,
    /// Total delivered, including `initial`
    pub delivered: u32,
    pub target: u32,
    /// Tasks that failed generation or publishing in this run
    pub failed: u32,
    pub shortfall: u32,
}

impl DestinationSummary {
    /// Delivered during this run
    pub fn published(&self) -> u32 {
        self.delivered.saturating_sub(self.initial)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub destinations: Vec<DestinationSummary>,
    /// Items never claimed
    pub unused_items: Vec<WorkItemId>,
    /// Items claimed but not delivered
    pub failed_items: Vec<WorkItemId>,
    pub allocations: Vec<Allocation>,
    pub duration: Duration,
    #[serde(skip)]
    pub stats: RunStatsSummary,
}

impl RunSummary {
    pub fn destination(&self, id: &str) -> Option<&DestinationSummary> {
        self.destinations.iter().find(|d| d.id == id)
    }

    pub fn total_delivered(&self) -> u32 {
        self.destinations.iter().map(DestinationSummary::published).sum()
    }

    pub fn total_shortfall(&self) -> u32 {
        self.destinations.iter().map(|d| d.shortfall).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Run Summary ({}) ===", self.outcome)?;
        writeln!(f, "Duration: {:.1}s", self.duration.as_secs_f64())?;
        for d in &self.destinations {
            writeln!(
                f,
                "  {:<24} {:>4}/{:<4} (+{}, failed {}, shortfall {})",
                d.id.as_str(),
                d.delivered,
                d.target,
                d.published(),
                d.failed,
                d.shortfall
            )?;
        }
        writeln!(
            f,
            "Items: {} allocated, {} failed, {} unused",
            self.allocations.len(),
            self.failed_items.len(),
            self.unused_items.len()
        )?;
        write!(f, "{}", self.stats)
    }
}
