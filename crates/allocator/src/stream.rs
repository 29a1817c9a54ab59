//! WorkStream - priority-ordered, shuffled backlog
//!
//! Items are ranked first (lower rank wins), optionally cut to a priority
//! window, then shuffled so no destination is systematically handed the
//! best-ranked items.

use std::collections::{HashSet, VecDeque};

use contracts::{WorkItem, WorkItemId};
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Default)]
pub struct WorkStream {
    items: VecDeque<WorkItem>,
}

impl WorkStream {
    /// Rank, window, then shuffle `items`
    ///
    /// Items flagged `used` never enter the stream.
    pub fn shuffled<R: Rng + ?Sized>(
        items: Vec<WorkItem>,
        window: Option<usize>,
        rng: &mut R,
    ) -> Self {
        let mut ranked = Self::ranked(items, window);
        ranked.make_contiguous().shuffle(rng);
        Self { items: ranked }
    }

    /// Keep backlog order as given (used items still dropped)
    pub fn ordered(items: Vec<WorkItem>) -> Self {
        Self {
            items: items.into_iter().filter(|item| !item.used).collect(),
        }
    }

    fn ranked(items: Vec<WorkItem>, window: Option<usize>) -> VecDeque<WorkItem> {
        let mut items: Vec<WorkItem> = items.into_iter().filter(|item| !item.used).collect();
        // stable: equal ranks keep backlog order
        items.sort_by_key(|item| item.rank);
        if let Some(window) = window {
            items.truncate(window);
        }
        items.into()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pop the next item whose id has not been claimed, claiming it
    ///
    /// Duplicates of already-claimed ids are discarded on the way.
    pub fn claim_next(&mut self, claimed: &mut HashSet<WorkItemId>) -> Option<WorkItem> {
        while let Some(item) = self.items.pop_front() {
            if claimed.insert(item.id.clone()) {
                return Some(item);
            }
            tracing::debug!(item = %item.id, "Skipping duplicate work item");
        }
        None
    }

    /// Distinct ids still in the stream and not claimed
    pub fn unclaimed_ids(&self, claimed: &HashSet<WorkItemId>) -> Vec<WorkItemId> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .filter(|item| !claimed.contains(&item.id) && seen.insert(item.id.clone()))
            .map(|item| item.id.clone())
            .collect()
    }
}
