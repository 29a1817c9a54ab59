//! RequestDispatcher - one logical outbound call with rotation and retries

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use contracts::{AttemptRecord, ContentEngine, RequestSpec, RetryConfig};

use crate::backoff::BackoffPolicy;
use crate::breaker::BreakerHandle;
use crate::error::DispatchError;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::pool::PoolRegistry;

/// Dispatches requests to a content engine
///
/// Cheap to clone: pools, breaker, engine and metrics are shared. Each
/// worker holds its own clone.
pub struct RequestDispatcher<E> {
    engine: Arc<E>,
    pools: Arc<PoolRegistry>,
    breaker: BreakerHandle,
    backoff: BackoffPolicy,
    metrics: Arc<DispatchMetrics>,
}

impl<E> Clone for RequestDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            pools: Arc::clone(&self.pools),
            breaker: self.breaker.clone(),
            backoff: self.backoff,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<E> RequestDispatcher<E>
where
    E: ContentEngine + Send + Sync + 'static,
{
    pub fn new(
        engine: Arc<E>,
        pools: Arc<PoolRegistry>,
        breaker: BreakerHandle,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            engine,
            pools,
            breaker,
            backoff,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Build with backoff settings taken from `[retry]`
    pub fn from_retry_config(
        engine: Arc<E>,
        pools: Arc<PoolRegistry>,
        breaker: BreakerHandle,
        retry: &RetryConfig,
    ) -> Self {
        Self::new(engine, pools, breaker, BackoffPolicy::from_config(retry))
    }

    /// Clone sharing engine, pools and breaker but counting into its own metrics
    pub fn with_fresh_metrics(&self) -> Self {
        Self {
            metrics: Arc::new(DispatchMetrics::new()),
            ..self.clone()
        }
    }

    pub fn breaker(&self) -> &BreakerHandle {
        &self.breaker
    }

    pub fn pools(&self) -> &Arc<PoolRegistry> {
        &self.pools
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Perform one logical call with up to `max_retries` attempts
    ///
    /// Auth failures rotate to the next credential immediately. Rate limits
    /// penalize the credential and back off. Other failures back off without
    /// penalty.
    ///
    /// # Errors
    /// - `BreakerTripped` if the breaker is tripped before any attempt
    /// - `RetriesExhausted` with one record per failed attempt
    /// - `UnknownService` / `PoolExhausted` for a missing or empty pool
    #[instrument(
        name = "dispatcher_dispatch",
        skip(self, spec),
        fields(service = %spec.service, engine = self.engine.name())
    )]
    pub async fn dispatch(
        &self,
        spec: &RequestSpec,
        max_retries: u32,
    ) -> Result<String, DispatchError> {
        let pool = self.pools.get(&spec.service)?;
        let mut history = Vec::with_capacity(max_retries as usize);

        for attempt in 0..max_retries {
            self.breaker.check_or_abort()?;

            let lease = pool.next().await?;
            // next() may have slept through a pool cool-down
            self.breaker.check_or_abort()?;
            let auth = pool.auth_header(&lease);
            self.metrics.inc_attempts();

            match self.engine.generate(spec, &auth).await {
                Ok(content) => {
                    pool.mark_success(&lease).await;
                    self.metrics.inc_successes();
                    observability::record_attempt(&spec.service, "success");
                    debug!(attempt, credential = %lease.masked(), "Dispatch succeeded");
                    return Ok(content);
                }
                Err(err) => {
                    self.metrics.inc_failures();
                    observability::record_attempt(&spec.service, err.kind.as_str());
                    warn!(
                        attempt,
                        kind = %err.kind,
                        status = ?err.status,
                        credential = %lease.masked(),
                        error = %err.message,
                        "Attempt failed"
                    );

                    if err.kind.penalizes_credential() {
                        pool.mark_failure(&lease).await;
                    }

                    history.push(AttemptRecord {
                        attempt,
                        kind: err.kind,
                        message: err.message,
                        credential: lease.masked(),
                    });

                    let last = attempt + 1 >= max_retries;
                    if err.kind.backs_off() && !last {
                        let delay = self.backoff.delay(attempt);
                        self.metrics.add_backoff(delay.as_millis() as u64);
                        observability::record_backoff(&spec.service, delay.as_secs_f64());
                        debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.metrics.inc_exhausted();
        Err(DispatchError::retries_exhausted(&spec.service, history))
    }
}
