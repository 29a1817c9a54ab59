//! BatchScheduler - bounded worker pool for one sub-batch
//!
//! Tasks go into one shared job queue; `min(limit, tasks)` workers pull from
//! it and report completions over an mpsc channel. The first completion
//! carrying a breaker trip cancels the batch: queued tasks are drained as
//! cancelled, in-flight tasks finish but are reported as-is.

use std::sync::Arc;
use tokio::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use contracts::{Task, TaskState};
use dispatcher::{BreakerHandle, DispatchError};

use crate::error::SchedulerError;
use crate::result::{BatchOutcome, TaskOutcome, TaskResult};
use crate::runner::{RunnerFactory, TaskRunner};

enum WorkerEvent {
    Completed(TaskResult),
    /// Pulled from the queue after a trip; never started
    Skipped(Task),
}

/// Runs sub-batches under bounded concurrency
pub struct BatchScheduler<F> {
    factory: Arc<F>,
    breaker: BreakerHandle,
}

impl<F> Clone for BatchScheduler<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            breaker: self.breaker.clone(),
        }
    }
}

impl<F: RunnerFactory> BatchScheduler<F> {
    pub fn new(factory: F, breaker: BreakerHandle) -> Self {
        Self {
            factory: Arc::new(factory),
            breaker,
        }
    }

    pub fn breaker(&self) -> &BreakerHandle {
        &self.breaker
    }

    /// Run `tasks` with at most `concurrency_limit` in flight
    ///
    /// Results come back in completion order. Non-breaker failures are
    /// recorded per task and never halt the batch.
    ///
    /// # Errors
    /// `WorkerFailed` if a worker task panics.
    #[instrument(
        name = "batch_scheduler_run_batch",
        skip(self, tasks),
        fields(tasks = tasks.len())
    )]
    pub async fn run_batch(
        &self,
        tasks: Vec<Task>,
        concurrency_limit: usize,
    ) -> Result<BatchOutcome, SchedulerError> {
        let mut outcome = BatchOutcome::default();
        let total = tasks.len();
        if total == 0 {
            return Ok(outcome);
        }

        let workers = concurrency_limit.max(1).min(total);
        let (job_tx, job_rx) = async_channel::bounded::<Task>(total);
        for task in tasks {
            if let Err(e) = job_tx.try_send(task) {
                // capacity == total; only reachable if the queue closed
                outcome.cancel(e.into_inner());
            }
        }
        job_tx.close();

        let (result_tx, mut result_rx) = mpsc::channel(total);
        let cancel = CancellationToken::new();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let runner = self.factory.create(worker_id);
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                runner,
                job_rx.clone(),
                result_tx.clone(),
                self.breaker.clone(),
                cancel.clone(),
            )));
        }
        drop(result_tx);

        debug!(workers, tasks = total, "Batch started");

        while let Some(event) = result_rx.recv().await {
            match event {
                WorkerEvent::Completed(result) => {
                    if result.is_breaker_tripped() && !cancel.is_cancelled() {
                        warn!(task = %result.task.id, "Breaker tripped, cancelling batch");
                        cancel.cancel();
                        while let Ok(task) = job_rx.try_recv() {
                            outcome.cancel(task);
                        }
                    }
                    outcome.results.push(result);
                }
                WorkerEvent::Skipped(task) => outcome.cancel(task),
            }
        }

        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker = worker_id, error = ?e, "Worker task panicked");
                return Err(SchedulerError::worker_failed(worker_id, e.to_string()));
            }
        }

        // Workers stopped on cancel may leave queued tasks behind
        while let Ok(task) = job_rx.try_recv() {
            outcome.cancel(task);
        }

        outcome.tripped = cancel.is_cancelled() || self.breaker.is_tripped();

        for _ in 0..outcome.cancelled_count() {
            observability::record_task_completed("cancelled", 0.0);
        }

        info!(
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            cancelled = outcome.cancelled_count(),
            tripped = outcome.tripped,
            "Batch finished"
        );
        Ok(outcome)
    }
}

/// Worker task that pulls jobs until the queue drains or the batch is cancelled
#[instrument(
    name = "batch_worker_loop",
    skip(runner, jobs, results, breaker, cancel),
    fields(worker = worker_id)
)]
async fn worker_loop<R: TaskRunner>(
    worker_id: usize,
    mut runner: R,
    jobs: async_channel::Receiver<Task>,
    results: mpsc::Sender<WorkerEvent>,
    breaker: BreakerHandle,
    cancel: CancellationToken,
) {
    debug!(worker = worker_id, "Worker started");

    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = jobs.recv() => match job {
                Ok(task) => task,
                Err(_) => break,
            },
        };

        if cancel.is_cancelled() || breaker.check_or_abort().is_err() {
            let _ = results.send(WorkerEvent::Skipped(task)).await;
            break;
        }

        let result = execute(&mut runner, task, &breaker).await;
        if results.send(WorkerEvent::Completed(result)).await.is_err() {
            break;
        }
    }

    debug!(worker = worker_id, "Worker stopped");
}

/// Run one task and account its outcome against the breaker
async fn execute<R: TaskRunner>(runner: &mut R, mut task: Task, breaker: &BreakerHandle) -> TaskResult {
    task.state = TaskState::Running;
    let started = Instant::now();
    let run = runner.run(&task).await;
    let duration = started.elapsed();

    let outcome = match run {
        Ok(artifact) => {
            breaker.record_success();
            task.state = TaskState::Succeeded;
            TaskOutcome::Succeeded(artifact)
        }
        Err(DispatchError::RetriesExhausted { service, history }) => {
            task.state = TaskState::Failed;
            let mut error = DispatchError::RetriesExhausted {
                service,
                history: history.clone(),
            };
            // One unit of budget per failed attempt actually made
            for _ in &history {
                if let Err(tripped) = breaker.record_failure() {
                    error = tripped;
                    break;
                }
            }
            TaskOutcome::Failed { error, history }
        }
        Err(error) => {
            task.state = TaskState::Failed;
            TaskOutcome::Failed {
                error,
                history: Vec::new(),
            }
        }
    };

    let status = match task.state {
        TaskState::Succeeded => "succeeded",
        _ => "failed",
    };
    observability::record_task_completed(status, duration.as_secs_f64() * 1000.0);
    if let TaskOutcome::Failed { error, .. } = &outcome {
        warn!(task = %task.id, item = %task.item.id, error = %error, "Task failed");
    }

    TaskResult {
        task,
        outcome,
        duration,
    }
}
