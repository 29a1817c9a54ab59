//! Session orchestrator - builds pools, breaker, dispatcher, scheduler and
//! allocator from one `RunConfig`, then drives a single run.

use std::sync::Arc;

use allocator::{AllocatorError, AllocatorSettings, DestinationTarget, QuotaAllocator};
use anyhow::{Context, Result};
use contracts::{ContentEngine, RunConfig, WorkItem};
use dispatcher::{BreakerHandle, PoolRegistry, RequestDispatcher};
use engines::{ConfiguredSink, DispatchingTranslator, HttpContentEngine, MockEngine};
use scheduler::{ArticleRunnerFactory, ArticleSettings, BatchScheduler};
use tracing::info;

use super::{SessionOutcome, SessionReport};

/// Which content engine backs the run
#[derive(Debug, Clone, Copy)]
pub enum EngineChoice {
    Http,
    Mock { failure_ratio: f64 },
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub config: RunConfig,
    pub backlog: Vec<WorkItem>,
    pub engine: EngineChoice,
    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// One allocation run
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Run to completion or abort
    ///
    /// A breaker trip is reported as [`SessionOutcome::Aborted`], not as an
    /// error; errors are setup or I/O failures.
    pub async fn run(self) -> Result<SessionReport> {
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        match self.config.engine {
            EngineChoice::Http => {
                let engine = HttpContentEngine::from_config(&self.config.config)
                    .context("Failed to build HTTP engine")?;
                self.run_with(Arc::new(engine)).await
            }
            EngineChoice::Mock { failure_ratio } => {
                let mut engine = MockEngine::new(failure_ratio);
                if let Some(seed) = self.config.config.allocation.seed {
                    engine = engine.with_seed(seed);
                }
                info!(failure_ratio, "Using mock engine");
                self.run_with(Arc::new(engine)).await
            }
        }
    }

    async fn run_with<E>(self, engine: Arc<E>) -> Result<SessionReport>
    where
        E: ContentEngine + Send + Sync + 'static,
    {
        let SessionConfig {
            config, backlog, ..
        } = self.config;

        let pools = Arc::new(PoolRegistry::from_config(&config));
        let breaker = BreakerHandle::new(config.breaker.threshold);
        let dispatcher = RequestDispatcher::from_retry_config(
            engine,
            Arc::clone(&pools),
            breaker.clone(),
            &config.retry,
        );

        let settings = ArticleSettings::from_config(&config)?;
        let translation_dispatcher = dispatcher.with_fresh_metrics();
        let translator =
            DispatchingTranslator::new(translation_dispatcher.clone(), settings.service.clone());
        let factory = ArticleRunnerFactory::new(dispatcher.clone(), translator, settings);
        let scheduler = BatchScheduler::new(factory, breaker.clone());

        let sink = ConfiguredSink::from_config(&config.publish)?;
        let mut allocator =
            QuotaAllocator::new(scheduler, sink, AllocatorSettings::from_config(&config));

        let stream = allocator.prepare(backlog);
        let destinations = DestinationTarget::from_config(&config);
        info!(
            items = stream.len(),
            destinations = destinations.len(),
            services = pools.services().count(),
            "Session starting"
        );

        let outcome = match allocator.run(stream, &destinations).await {
            Ok(summary) => SessionOutcome::Finished(summary),
            Err(AllocatorError::BreakerTripped { summary, history }) => SessionOutcome::Aborted {
                summary: *summary,
                history,
            },
            Err(e) => return Err(e).context("Allocation failed"),
        };

        Ok(SessionReport {
            outcome,
            credentials: pools.stats().await,
            dispatch: dispatcher.metrics(),
            translation: translation_dispatcher.metrics(),
            breaker: breaker.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DestinationConfig, ServiceConfig};

    fn config(threshold: u32) -> RunConfig {
        let mut config = RunConfig::default();
        config.breaker.threshold = threshold;
        config.retry.time_unit_ms = 1;
        config.scheduler.batch_pacing_ms = 0;
        config.scheduler.concurrency = 1;
        config.allocation.seed = Some(5);
        config.allocation.per_destination_target = 2;
        config.allocation.destinations = vec![
            DestinationConfig {
                id: "a".into(),
                target: None,
                primary_language: None,
            },
            DestinationConfig {
                id: "b".into(),
                target: Some(1),
                primary_language: None,
            },
        ];
        config.services = vec![ServiceConfig {
            name: "mock".into(),
            format: Default::default(),
            endpoint: String::new(),
            model: String::new(),
            auth: Default::default(),
            timeout_secs: 60,
            headers: Default::default(),
            keys: vec!["k1".into(), "k2".into()],
            keys_env: None,
            sampling: Default::default(),
        }];
        config
    }

    fn backlog(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem::new(format!("w{i}"), format!("Item {i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_mock_session_completes() {
        let session = Session::new(SessionConfig {
            config: config(5),
            backlog: backlog(5),
            engine: EngineChoice::Mock { failure_ratio: 0.0 },
            metrics_port: None,
        });
        let report = session.run().await.unwrap();

        let SessionOutcome::Finished(summary) = &report.outcome else {
            panic!("expected a finished run");
        };
        assert_eq!(summary.total_delivered(), 3);
        assert_eq!(report.credentials.len(), 2);
        assert_eq!(report.dispatch.successes, 3);
        assert!(!report.is_aborted());
    }

    #[tokio::test]
    async fn test_translations_counted_apart_from_generation() {
        let mut config = config(5);
        config.generation.languages = vec!["ja".into(), "ko".into()];
        let session = Session::new(SessionConfig {
            config,
            backlog: backlog(5),
            engine: EngineChoice::Mock { failure_ratio: 0.0 },
            metrics_port: None,
        });
        let report = session.run().await.unwrap();

        assert_eq!(report.summary().total_delivered(), 3);
        assert_eq!(report.dispatch.successes, 3);
        assert_eq!(report.translation.successes, 6);
    }

    #[tokio::test]
    async fn test_mock_session_aborts_on_trip() {
        let session = Session::new(SessionConfig {
            config: config(2),
            backlog: backlog(5),
            engine: EngineChoice::Mock { failure_ratio: 1.0 },
            metrics_port: None,
        });
        let report = session.run().await.unwrap();

        assert!(report.is_aborted());
        assert_eq!(report.history().len(), 3);
        assert!(report.summary().total_delivered() == 0);
    }
}
