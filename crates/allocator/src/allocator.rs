//! QuotaAllocator - hands sub-batches to destinations until quotas are met
//!
//! The loop is single-threaded: one destination decision at a time, and
//! only the tasks within a sub-batch run concurrently.

use std::collections::HashSet;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    Allocation, DestinationId, PublishSink, RunConfig, Task, TaskId, WorkItem, WorkItemId,
};
use observability::RunStatsAggregator;
use scheduler::{BatchScheduler, RunnerFactory, TaskOutcome, TaskResult};

use crate::error::AllocatorError;
use crate::stream::WorkStream;
use crate::summary::{DestinationSummary, RunOutcome, RunSummary};

/// Loop settings
#[derive(Debug, Clone)]
pub struct AllocatorSettings {
    /// Upper bound on one sub-batch
    pub batch_size: usize,
    /// Workers per sub-batch
    pub concurrency: usize,
    /// Pause between consecutive sub-batches
    pub batch_pacing: Duration,
    pub priority_window: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self {
            batch_size: 4,
            concurrency: 4,
            batch_pacing: Duration::from_millis(2000),
            priority_window: None,
            seed: None,
        }
    }
}

impl AllocatorSettings {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            batch_size: config.scheduler.batch_size,
            concurrency: config.scheduler.concurrency,
            batch_pacing: config.scheduler.batch_pacing(),
            priority_window: config.allocation.priority_window,
            seed: config.allocation.seed,
        }
    }
}

/// A destination and its quota for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTarget {
    pub id: DestinationId,
    pub target: u32,
}

impl DestinationTarget {
    pub fn new(id: impl Into<DestinationId>, target: u32) -> Self {
        Self {
            id: id.into(),
            target,
        }
    }

    pub fn from_config(config: &RunConfig) -> Vec<Self> {
        config
            .allocation
            .destinations
            .iter()
            .map(|d| Self::new(d.id.clone(), config.target_for(d)))
            .collect()
    }
}

struct Progress {
    id: DestinationId,
    initial: u32,
    delivered: u32,
    target: u32,
    failed: u32,
}

impl Progress {
    fn remaining(&self) -> u32 {
        self.target.saturating_sub(self.delivered)
    }

    fn summary(&self) -> DestinationSummary {
        DestinationSummary {
            id: self.id.clone(),
            initial: self.initial,
            delivered: self.delivered,
            target: self.target,
            failed: self.failed,
            shortfall: self.remaining(),
        }
    }
}

/// Bookkeeping owned by one `run` call
struct RunState {
    started: Instant,
    progress: Vec<Progress>,
    claimed: HashSet<WorkItemId>,
    allocations: Vec<Allocation>,
    failed_items: Vec<WorkItemId>,
    stats: RunStatsAggregator,
}

impl RunState {
    fn finish(self, outcome: RunOutcome, stream: &WorkStream) -> RunSummary {
        RunSummary {
            outcome,
            destinations: self.progress.iter().map(Progress::summary).collect(),
            unused_items: stream.unclaimed_ids(&self.claimed),
            failed_items: self.failed_items,
            allocations: self.allocations,
            duration: self.started.elapsed(),
            stats: self.stats.summary(),
        }
    }
}

pub struct QuotaAllocator<F, S> {
    scheduler: BatchScheduler<F>,
    sink: S,
    settings: AllocatorSettings,
    rng: StdRng,
    next_task: u64,
}

impl<F, S> QuotaAllocator<F, S>
where
    F: RunnerFactory,
    S: PublishSink,
{
    pub fn new(scheduler: BatchScheduler<F>, sink: S, settings: AllocatorSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            scheduler,
            sink,
            settings,
            rng,
            next_task: 0,
        }
    }

    pub fn settings(&self) -> &AllocatorSettings {
        &self.settings
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Build the run's work stream from a raw backlog, using the run RNG
    pub fn prepare(&mut self, backlog: Vec<WorkItem>) -> WorkStream {
        WorkStream::shuffled(backlog, self.settings.priority_window, &mut self.rng)
    }

    /// Allocate `stream` across `destinations` until every quota is met or
    /// the stream runs dry
    ///
    /// # Errors
    /// - `BreakerTripped` with the frozen summary; the tripped sub-batch is
    ///   never published
    /// - `Sink` if a delivered-count query fails at start-up
    /// - `Scheduler` if a worker dies
    #[instrument(
        name = "quota_allocator_run",
        skip_all,
        fields(destinations = destinations.len(), items = stream.len())
    )]
    pub async fn run(
        &mut self,
        mut stream: WorkStream,
        destinations: &[DestinationTarget],
    ) -> Result<RunSummary, AllocatorError> {
        let mut state = RunState {
            started: Instant::now(),
            progress: Vec::with_capacity(destinations.len()),
            claimed: HashSet::new(),
            allocations: Vec::new(),
            failed_items: Vec::new(),
            stats: RunStatsAggregator::new(),
        };

        for dest in destinations {
            let initial = self.sink.query_delivered_count(&dest.id).await?;
            info!(
                destination = %dest.id,
                delivered = initial,
                target = dest.target,
                "Destination loaded"
            );
            observability::record_destination_progress(&dest.id, initial, dest.target);
            state.progress.push(Progress {
                id: dest.id.clone(),
                initial,
                delivered: initial,
                target: dest.target,
                failed: 0,
            });
        }

        let mut batches = 0usize;
        loop {
            let eligible: Vec<usize> = state
                .progress
                .iter()
                .enumerate()
                .filter(|(_, p)| p.remaining() > 0)
                .map(|(i, _)| i)
                .collect();
            let Some(&index) = eligible.choose(&mut self.rng) else {
                info!("All destinations reached target");
                break;
            };

            let destination = state.progress[index].id.clone();
            let want = (state.progress[index].remaining() as usize)
                .min(self.settings.batch_size.max(1));
            let tasks = self.claim(&mut stream, &mut state, &destination, want);
            if tasks.is_empty() {
                info!("Work stream exhausted");
                break;
            }

            if batches > 0 && !self.settings.batch_pacing.is_zero() {
                debug!(pacing_ms = self.settings.batch_pacing.as_millis() as u64, "Pacing");
                tokio::time::sleep(self.settings.batch_pacing).await;
            }
            batches += 1;

            let size = tasks.len();
            info!(destination = %destination, size, batch = batches, "Dispatching sub-batch");
            let outcome = self
                .scheduler
                .run_batch(tasks, self.settings.concurrency)
                .await?;

            state.stats.record_batch(size, outcome.cancelled_count());
            for result in &outcome.results {
                state.stats.record_task(
                    result.is_success(),
                    result.duration.as_secs_f64() * 1000.0,
                    result.history(),
                );
            }

            if outcome.tripped {
                let history = outcome.trip_history();
                state.progress[index].failed += size as u32;
                state
                    .failed_items
                    .extend(outcome.results.iter().map(|r| r.task.item.id.clone()));
                state
                    .failed_items
                    .extend(outcome.cancelled.iter().map(|t| t.item.id.clone()));
                observability::record_batch_completed(
                    &destination,
                    0,
                    outcome.failed(),
                    outcome.cancelled_count(),
                );
                error!(
                    destination = %destination,
                    attempts = history.len(),
                    cancelled = outcome.cancelled_count(),
                    "Circuit breaker tripped, aborting run"
                );
                return Err(AllocatorError::BreakerTripped {
                    summary: Box::new(state.finish(RunOutcome::Aborted, &stream)),
                    history,
                });
            }

            let cancelled = outcome.cancelled_count();
            state
                .failed_items
                .extend(outcome.cancelled.iter().map(|t| t.item.id.clone()));

            let mut delivered = 0u32;
            let mut failed = cancelled as u32;
            for result in outcome.results {
                if self.publish(result, &mut state, index).await {
                    delivered += 1;
                } else {
                    failed += 1;
                }
            }

            let progress = &mut state.progress[index];
            progress.failed += failed;
            observability::record_delivered(&destination, delivered);
            observability::record_destination_progress(
                &destination,
                progress.delivered,
                progress.target,
            );
            observability::record_batch_completed(
                &destination,
                delivered as usize,
                failed as usize,
                cancelled,
            );
            info!(
                destination = %destination,
                delivered = progress.delivered,
                target = progress.target,
                failed,
                "Sub-batch finished"
            );
        }

        let outcome = if state.progress.iter().all(|p| p.remaining() == 0) {
            RunOutcome::Complete
        } else {
            for p in state.progress.iter().filter(|p| p.remaining() > 0) {
                warn!(destination = %p.id, shortfall = p.remaining(), "Destination short of target");
            }
            RunOutcome::Partial
        };

        Ok(state.finish(outcome, &stream))
    }

    /// Claim up to `want` items for `destination`, permanently
    fn claim(
        &mut self,
        stream: &mut WorkStream,
        state: &mut RunState,
        destination: &DestinationId,
        want: usize,
    ) -> Vec<Task> {
        let mut tasks = Vec::with_capacity(want);
        while tasks.len() < want {
            let Some(item) = stream.claim_next(&mut state.claimed) else {
                break;
            };
            let id = TaskId(self.next_task);
            self.next_task += 1;
            state.allocations.push(Allocation {
                item: item.id.clone(),
                destination: destination.clone(),
                task: id,
            });
            tasks.push(Task::new(id, item, destination.clone()));
        }
        tasks
    }

    /// Publish one result; true only on a confirmed delivery
    async fn publish(&mut self, result: TaskResult, state: &mut RunState, index: usize) -> bool {
        let TaskResult { task, outcome, .. } = result;
        let artifact = match outcome {
            TaskOutcome::Succeeded(artifact) => artifact,
            TaskOutcome::Failed { error, .. } => {
                warn!(task = %task.id, item = %task.item.id, error = %error, "Task failed");
                state.failed_items.push(task.item.id);
                return false;
            }
        };

        let progress = &mut state.progress[index];
        let is_final = progress.delivered + 1 == progress.target;
        match self.sink.publish(&artifact, &progress.id, is_final).await {
            Ok(()) => {
                progress.delivered += 1;
                debug!(item = %artifact.item_id, is_final, "Artifact published");
                true
            }
            Err(e) => {
                warn!(item = %artifact.item_id, error = %e, "Publish failed");
                state.failed_items.push(task.item.id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Artifact, AttemptRecord, ContractError, FailureKind};
    use dispatcher::{BreakerHandle, DispatchError};
    use parking_lot::Mutex;
    use scheduler::TaskRunner;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Succeeds for the first `succeed_first` calls (shared across workers),
    /// and for any item not in `fail_items`
    #[derive(Clone, Default)]
    struct FakeRunner {
        calls: Arc<AtomicUsize>,
        succeed_first: Option<usize>,
        fail_items: Arc<HashSet<String>>,
        delays: Arc<HashMap<String, Duration>>,
    }

    impl TaskRunner for FakeRunner {
        async fn run(&mut self, task: &Task) -> Result<Artifact, DispatchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(task.item.id.as_str()) {
                tokio::time::sleep(*delay).await;
            }
            let fail = match self.succeed_first {
                Some(limit) => n >= limit,
                None => self.fail_items.contains(task.item.id.as_str()),
            };
            if fail {
                let history = (0..3)
                    .map(|attempt| AttemptRecord {
                        attempt,
                        kind: FailureKind::Transient,
                        message: "503".into(),
                        credential: "...key1".into(),
                    })
                    .collect();
                return Err(DispatchError::retries_exhausted("svc", history));
            }
            Ok(Artifact {
                item_id: task.item.id.clone(),
                title: task.item.title.clone(),
                primary_language: "en".into(),
                content: format!("content for {}", task.item.title),
                translations: Default::default(),
            })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        initial: HashMap<String, u32>,
        reject: HashSet<String>,
        published: Mutex<Vec<(String, String, bool)>>,
    }

    impl MemorySink {
        fn published(&self) -> Vec<(String, String, bool)> {
            self.published.lock().clone()
        }
    }

    impl PublishSink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        async fn query_delivered_count(
            &self,
            destination: &DestinationId,
        ) -> Result<u32, ContractError> {
            Ok(self.initial.get(destination.as_str()).copied().unwrap_or(0))
        }

        async fn publish(
            &mut self,
            artifact: &Artifact,
            destination: &DestinationId,
            is_final: bool,
        ) -> Result<(), ContractError> {
            if self.reject.contains(artifact.item_id.as_str()) {
                return Err(ContractError::publish("memory", artifact.item_id.as_str(), "rejected"));
            }
            self.published.lock().push((
                artifact.item_id.to_string(),
                destination.to_string(),
                is_final,
            ));
            Ok(())
        }
    }

    fn settings(batch_size: usize, concurrency: usize) -> AllocatorSettings {
        AllocatorSettings {
            batch_size,
            concurrency,
            batch_pacing: Duration::ZERO,
            priority_window: None,
            seed: Some(11),
        }
    }

    fn allocator(
        runner: FakeRunner,
        sink: MemorySink,
        settings: AllocatorSettings,
        threshold: u32,
    ) -> QuotaAllocator<impl RunnerFactory, MemorySink> {
        let scheduler = BatchScheduler::new(
            move |_worker: usize| runner.clone(),
            BreakerHandle::new(threshold),
        );
        QuotaAllocator::new(scheduler, sink, settings)
    }

    fn backlog(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem::new(format!("w{i}"), format!("Item {i}")).with_rank(i as i64))
            .collect()
    }

    fn two_sites(target: u32) -> Vec<DestinationTarget> {
        vec![
            DestinationTarget::new("site-a", target),
            DestinationTarget::new("site-b", target),
        ]
    }

    #[tokio::test]
    async fn test_all_targets_met() {
        let mut alloc = allocator(FakeRunner::default(), MemorySink::default(), settings(4, 2), 5);
        let stream = alloc.prepare(backlog(10));
        let summary = alloc.run(stream, &two_sites(3)).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Complete);
        for d in &summary.destinations {
            assert_eq!(d.delivered, 3);
            assert_eq!(d.shortfall, 0);
        }
        assert_eq!(summary.allocations.len(), 6);
        assert_eq!(summary.unused_items.len(), 4);
        assert!(summary.failed_items.is_empty());

        // each destination gets exactly one final marker
        let published = alloc.sink().published();
        assert_eq!(published.len(), 6);
        for site in ["site-a", "site-b"] {
            let finals = published
                .iter()
                .filter(|(_, d, is_final)| d == site && *is_final)
                .count();
            assert_eq!(finals, 1);
        }
    }

    #[tokio::test]
    async fn test_remaining_need_from_observed_count() {
        let sink = MemorySink {
            initial: HashMap::from([("site-a".to_string(), 4)]),
            ..Default::default()
        };
        let mut alloc = allocator(FakeRunner::default(), sink, settings(4, 4), 5);
        let stream = WorkStream::ordered(backlog(10));
        let summary = alloc
            .run(stream, &[DestinationTarget::new("site-a", 5)])
            .await
            .unwrap();

        assert_eq!(summary.allocations.len(), 1);
        let site = summary.destination("site-a").unwrap();
        assert_eq!((site.initial, site.delivered, site.target), (4, 5, 5));
        assert_eq!(alloc.sink().published(), vec![("w0".into(), "site-a".into(), true)]);
    }

    #[tokio::test]
    async fn test_target_already_met_claims_nothing() {
        let sink = MemorySink {
            initial: HashMap::from([("site-a".to_string(), 7)]),
            ..Default::default()
        };
        let mut alloc = allocator(FakeRunner::default(), sink, settings(4, 4), 5);
        let summary = alloc
            .run(WorkStream::ordered(backlog(3)), &[DestinationTarget::new("site-a", 5)])
            .await
            .unwrap();
        assert_eq!(summary.outcome, RunOutcome::Complete);
        assert!(summary.allocations.is_empty());
        assert_eq!(summary.unused_items.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_items_are_lost_not_retried() {
        let runner = FakeRunner {
            fail_items: Arc::new(HashSet::from(["w1".to_string()])),
            ..Default::default()
        };
        let mut alloc = allocator(runner, MemorySink::default(), settings(2, 1), 50);
        let summary = alloc
            .run(WorkStream::ordered(backlog(6)), &two_sites(2))
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Complete);
        assert_eq!(summary.failed_items, vec!["w1"]);
        // w1 is allocated exactly once
        let w1: Vec<_> = summary.allocations.iter().filter(|a| a.item == "w1").collect();
        assert_eq!(w1.len(), 1);
        assert_eq!(summary.allocations.len(), 5);
        let failed: u32 = summary.destinations.iter().map(|d| d.failed).sum();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_counts_as_failed() {
        let sink = MemorySink {
            reject: HashSet::from(["w0".to_string()]),
            ..Default::default()
        };
        let mut alloc = allocator(FakeRunner::default(), sink, settings(1, 1), 5);
        let summary = alloc
            .run(WorkStream::ordered(backlog(3)), &[DestinationTarget::new("site-a", 2)])
            .await
            .unwrap();

        assert_eq!(summary.failed_items, vec!["w0"]);
        assert_eq!(summary.destination("site-a").unwrap().delivered, 2);
        // the second delivered artifact is the final one
        assert_eq!(
            alloc.sink().published(),
            vec![
                ("w1".into(), "site-a".into(), false),
                ("w2".into(), "site-a".into(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_exhaustion_is_partial() {
        let mut alloc = allocator(FakeRunner::default(), MemorySink::default(), settings(4, 4), 5);
        let summary = alloc
            .run(WorkStream::ordered(backlog(3)), &two_sites(3))
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Partial);
        assert_eq!(summary.total_delivered(), 3);
        assert_eq!(summary.total_shortfall(), 3);
        assert!(summary.unused_items.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ids_claimed_once() {
        let items = vec![
            WorkItem::new("a", "A"),
            WorkItem::new("a", "A dup"),
            WorkItem::new("b", "B"),
        ];
        let mut alloc = allocator(FakeRunner::default(), MemorySink::default(), settings(4, 4), 5);
        let summary = alloc
            .run(WorkStream::ordered(items), &two_sites(5))
            .await
            .unwrap();

        let mut claimed: Vec<_> = summary.allocations.iter().map(|a| a.item.to_string()).collect();
        claimed.sort();
        assert_eq!(claimed, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_trip_freezes_delivered_and_skips_publish() {
        // first batch of 2 succeeds, everything after fails
        let runner = FakeRunner {
            succeed_first: Some(2),
            ..Default::default()
        };
        let mut alloc = allocator(runner, MemorySink::default(), settings(2, 1), 5);
        let err = alloc
            .run(WorkStream::ordered(backlog(10)), &[DestinationTarget::new("site-a", 6)])
            .await
            .unwrap_err();

        let AllocatorError::BreakerTripped { summary, history } = err else {
            panic!("expected BreakerTripped");
        };
        assert_eq!(summary.outcome, RunOutcome::Aborted);
        assert_eq!(summary.destination("site-a").unwrap().delivered, 2);
        // 3 + 2 failed attempts trip a threshold of 5; both histories are kept
        assert_eq!(history.len(), 6);
        assert_eq!(alloc.sink().published().len(), 2);
        // nothing in the tripped batch is re-queued
        assert_eq!(summary.allocations.len(), 4);
        assert_eq!(summary.unused_items.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_discards_in_flight_successes() {
        // w0 trips at 10ms; w1 succeeds at 30ms and w2 exhausts at 50ms, both after the trip
        let runner = FakeRunner {
            fail_items: Arc::new(HashSet::from(["w0".to_string(), "w2".to_string()])),
            delays: Arc::new(HashMap::from([
                ("w0".to_string(), Duration::from_millis(10)),
                ("w1".to_string(), Duration::from_millis(30)),
                ("w2".to_string(), Duration::from_millis(50)),
            ])),
            ..Default::default()
        };
        let calls = Arc::clone(&runner.calls);
        let mut alloc = allocator(runner, MemorySink::default(), settings(6, 3), 3);
        let err = alloc
            .run(WorkStream::ordered(backlog(6)), &[DestinationTarget::new("site-a", 6)])
            .await
            .unwrap_err();

        let AllocatorError::BreakerTripped { summary, history } = err else {
            panic!("expected BreakerTripped");
        };
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(alloc.sink().published().is_empty());

        let site = summary.destination("site-a").unwrap();
        assert_eq!(site.delivered, 0);
        assert_eq!(site.failed, 6);
        assert_eq!(summary.failed_items.len(), 6);
        assert_eq!(history.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_batches() {
        let mut s = settings(1, 1);
        s.batch_pacing = Duration::from_secs(2);
        let mut alloc = allocator(FakeRunner::default(), MemorySink::default(), s, 5);

        let start = Instant::now();
        let summary = alloc
            .run(WorkStream::ordered(backlog(3)), &[DestinationTarget::new("site-a", 3)])
            .await
            .unwrap();
        assert_eq!(summary.total_delivered(), 3);
        // no pause before the first batch
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_seeded_runs_allocate_identically() {
        async fn allocations() -> Vec<Allocation> {
            let mut alloc =
                allocator(FakeRunner::default(), MemorySink::default(), settings(2, 2), 5);
            let stream = alloc.prepare(backlog(12));
            alloc.run(stream, &two_sites(4)).await.unwrap().allocations
        }
        assert_eq!(allocations().await, allocations().await);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = RunConfig::default();
        config.allocation.seed = Some(3);
        config.scheduler.batch_size = 7;
        let s = AllocatorSettings::from_config(&config);
        assert_eq!(s.batch_size, 7);
        assert_eq!(s.seed, Some(3));
    }
}
