//! # Integration Tests
//!
//! 跨 crate 集成测试与端到端场景。
//!
//! 负责：
//! - 分配场景 A–D（配额达成、熔断中止、已达标、凭证恢复）
//! - 跨 crate 不变量（不重复分配、交付计数精确）
//! - 配置驱动的完整装配

#[cfg(test)]
mod support {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use allocator::{AllocatorSettings, QuotaAllocator};
    use contracts::{AuthScheme, ContentEngine, PublishSink, WorkItem};
    use dispatcher::{BackoffPolicy, BreakerHandle, CredentialPool, PoolRegistry, RequestDispatcher};
    use engines::IdentityTranslator;
    use scheduler::{ArticleRunnerFactory, ArticleSettings, BatchScheduler};

    pub const SERVICE: &str = "svc";

    pub type Allocator<E, S> = QuotaAllocator<ArticleRunnerFactory<E, IdentityTranslator>, S>;

    /// Shared dispatch stack for one simulated run
    pub struct Harness<E> {
        pub engine: Arc<E>,
        pub pools: Arc<PoolRegistry>,
        pub breaker: BreakerHandle,
        pub dispatcher: RequestDispatcher<E>,
    }

    impl<E> Harness<E>
    where
        E: ContentEngine + Send + Sync + 'static,
    {
        pub fn new(engine: E, keys: &[&str], threshold: u32) -> Self {
            let mut registry = PoolRegistry::new();
            registry.insert(CredentialPool::new(
                SERVICE,
                AuthScheme::Bearer,
                keys.iter().copied(),
                Duration::from_secs(30),
            ));
            let pools = Arc::new(registry);
            let breaker = BreakerHandle::new(threshold);
            let engine = Arc::new(engine);
            let dispatcher = RequestDispatcher::new(
                engine.clone(),
                pools.clone(),
                breaker.clone(),
                BackoffPolicy::new(30, Duration::from_secs(1)),
            );
            Self {
                engine,
                pools,
                breaker,
                dispatcher,
            }
        }

        pub fn allocator<S: PublishSink>(
            &self,
            sink: S,
            max_retries: u32,
            batch_size: usize,
            concurrency: usize,
        ) -> Allocator<E, S> {
            let article = ArticleSettings {
                service: SERVICE.to_string(),
                max_retries,
                primary_language: "en".to_string(),
                languages: Vec::new(),
                destination_languages: HashMap::new(),
            };
            let factory = ArticleRunnerFactory::new(self.dispatcher.clone(), IdentityTranslator, article);
            let scheduler = BatchScheduler::new(factory, self.breaker.clone());
            QuotaAllocator::new(
                scheduler,
                sink,
                AllocatorSettings {
                    batch_size,
                    concurrency,
                    batch_pacing: Duration::ZERO,
                    priority_window: None,
                    seed: Some(42),
                },
            )
        }
    }

    pub fn backlog(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem::new(format!("item-{i}"), format!("Topic {i}")).with_rank(i as i64))
            .collect()
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::collections::HashSet;

    use allocator::{AllocatorError, DestinationTarget, RunOutcome};
    use chrono::NaiveDate;
    use contracts::{EngineError, FailureKind, PublishSink};
    use engines::sinks::DEPLOY_MARKER;
    use engines::{DirectorySink, LogSink, ScriptedEngine};

    use crate::support::{backlog, Harness};

    /// Scenario A: two destinations reach their targets and the rest of the
    /// backlog stays unused
    #[tokio::test(start_paused = true)]
    async fn test_scenario_a_all_targets_met() {
        let harness = Harness::new(ScriptedEngine::echo(), &["k1", "k2"], 5);
        let mut allocator = harness.allocator(LogSink::new("log"), 3, 4, 2);
        let stream = allocator.prepare(backlog(10));

        let destinations = [
            DestinationTarget::new("site-a", 3),
            DestinationTarget::new("site-b", 3),
        ];
        let summary = allocator.run(stream, &destinations).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Complete);
        assert_eq!(summary.destination("site-a").unwrap().delivered, 3);
        assert_eq!(summary.destination("site-b").unwrap().delivered, 3);
        assert_eq!(summary.unused_items.len(), 4);
        assert_eq!(summary.allocations.len(), 6);
        assert!(summary.failed_items.is_empty());
        assert_eq!(summary.total_shortfall(), 0);

        assert_eq!(allocator.sink().delivered("site-a"), 3);
        assert_eq!(allocator.sink().delivered("site-b"), 3);
        assert_eq!(harness.engine.call_count(), 6);
        assert_eq!(harness.dispatcher.metrics().successes, 6);
        assert!(!harness.breaker.is_tripped());
    }

    /// Scenario B: every attempt fails; the breaker trips during the second
    /// task and the remaining tasks never start
    #[tokio::test(start_paused = true)]
    async fn test_scenario_b_breaker_aborts_run() {
        let engine = ScriptedEngine::always(EngineError::transient("upstream 503"));
        let harness = Harness::new(engine, &["k1", "k2"], 5);
        let mut allocator = harness.allocator(LogSink::new("log"), 3, 4, 1);
        let stream = allocator.prepare(backlog(6));

        let err = allocator
            .run(stream, &[DestinationTarget::new("site-a", 4)])
            .await
            .unwrap_err();

        let (summary, history) = match err {
            AllocatorError::BreakerTripped { summary, history } => (summary, history),
            other => panic!("expected BreakerTripped, got {other:?}"),
        };
        assert_eq!(history.len(), 6);
        assert!(history.iter().all(|r| r.kind == FailureKind::Transient));
        assert_eq!(harness.engine.call_count(), 6);
        assert!(harness.breaker.is_tripped());

        assert_eq!(summary.outcome, RunOutcome::Aborted);
        let site = summary.destination("site-a").unwrap();
        assert_eq!(site.delivered, 0);
        assert_eq!(site.failed, 4);
        assert_eq!(summary.failed_items.len(), 4);
        assert_eq!(summary.unused_items.len(), 2);
        assert_eq!(allocator.sink().delivered("site-a"), 0);
    }

    /// Delivered counts reached before the tripping sub-batch stay frozen
    #[tokio::test(start_paused = true)]
    async fn test_breaker_freezes_prior_deliveries() {
        let engine = ScriptedEngine::new([Ok("one".to_string()), Ok("two".to_string())])
            .with_fallback(Err(EngineError::rate_limited("429")));
        let harness = Harness::new(engine, &["k1", "k2", "k3"], 5);
        let mut allocator = harness.allocator(LogSink::new("log"), 3, 2, 1);
        let stream = allocator.prepare(backlog(8));

        let err = allocator
            .run(stream, &[DestinationTarget::new("site-a", 6)])
            .await
            .unwrap_err();

        let summary = err.summary().unwrap();
        assert_eq!(summary.destination("site-a").unwrap().delivered, 2);
        assert_eq!(err.history().len(), 6);
        assert_eq!(allocator.sink().delivered("site-a"), 2);
    }

    /// Scenario C: an already satisfied destination causes no work at all
    #[tokio::test]
    async fn test_scenario_c_target_already_met() {
        let harness = Harness::new(ScriptedEngine::echo(), &["k1"], 5);
        let sink = LogSink::new("log").with_delivered("site-a", 1);
        let mut allocator = harness.allocator(sink, 3, 4, 4);
        let stream = allocator.prepare(backlog(3));

        let summary = allocator
            .run(stream, &[DestinationTarget::new("site-a", 1)])
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Complete);
        assert!(summary.allocations.is_empty());
        assert_eq!(summary.unused_items.len(), 3);
        assert_eq!(summary.destination("site-a").unwrap().published(), 0);
        assert_eq!(harness.engine.call_count(), 0);
    }

    /// One missing artifact: a single task runs and its publish triggers the
    /// deployment marker
    #[tokio::test]
    async fn test_final_artifact_writes_deploy_marker() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let sink = DirectorySink::new("dir", dir.path()).unwrap().with_date(date);
        let day = sink.day_dir(&"site-a".into());
        for i in 0..4 {
            std::fs::create_dir_all(day.join(format!("earlier-{i}"))).unwrap();
        }

        let harness = Harness::new(ScriptedEngine::echo(), &["k1"], 5);
        let mut allocator = harness.allocator(sink, 3, 4, 4);
        let stream = allocator.prepare(backlog(5));

        let summary = allocator
            .run(stream, &[DestinationTarget::new("site-a", 5)])
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Complete);
        assert_eq!(summary.allocations.len(), 1);
        assert_eq!(harness.engine.call_count(), 1);
        assert!(dir.path().join("site-a").join(DEPLOY_MARKER).exists());
        assert_eq!(
            allocator
                .sink()
                .query_delivered_count(&"site-a".into())
                .await
                .unwrap(),
            5
        );
    }

    /// No item lands on two destinations even when the backlog repeats ids
    #[tokio::test(start_paused = true)]
    async fn test_items_never_assigned_twice() {
        let mut items = backlog(12);
        items.extend(backlog(6));

        let harness = Harness::new(ScriptedEngine::echo(), &["k1", "k2"], 5);
        let mut allocator = harness.allocator(LogSink::new("log"), 3, 3, 4);
        let stream = allocator.prepare(items);

        let destinations = [
            DestinationTarget::new("a", 4),
            DestinationTarget::new("b", 4),
            DestinationTarget::new("c", 4),
        ];
        let summary = allocator.run(stream, &destinations).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Complete);
        let ids: HashSet<_> = summary.allocations.iter().map(|a| a.item.clone()).collect();
        assert_eq!(ids.len(), summary.allocations.len());
        assert_eq!(ids.len(), 12);
        assert!(summary.unused_items.is_empty());
    }

    /// Delivered grows by exactly the confirmed successes under concurrency
    #[tokio::test(start_paused = true)]
    async fn test_delivered_counts_only_confirmed_successes() {
        let engine = ScriptedEngine::new([
            Ok("a".to_string()),
            Ok("b".to_string()),
            Ok("c".to_string()),
        ])
        .with_fallback(Err(EngineError::transient("timeout")));
        let harness = Harness::new(engine, &["k1", "k2"], 100);
        let mut allocator = harness.allocator(LogSink::new("log"), 1, 4, 4);
        let stream = allocator.prepare(backlog(8));

        let summary = allocator
            .run(stream, &[DestinationTarget::new("site-a", 5)])
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Partial);
        let site = summary.destination("site-a").unwrap();
        assert_eq!(site.delivered, 3);
        assert_eq!(site.failed, 5);
        assert_eq!(site.shortfall, 2);
        assert_eq!(summary.failed_items.len(), 5);
        assert_eq!(summary.allocations.len(), 8);
        assert_eq!(allocator.sink().delivered("site-a"), 3);
        assert_eq!(harness.engine.call_count(), 8);
    }
}

#[cfg(test)]
mod credential_tests {
    use std::time::Duration;

    use contracts::{AuthScheme, CredentialHealth, EngineError, RequestSpec};
    use dispatcher::CredentialPool;
    use engines::ScriptedEngine;

    use crate::support::{Harness, SERVICE};

    /// Scenario D: a credential quarantined after three failures rejoins the
    /// rotation on its next success
    #[tokio::test]
    async fn test_scenario_d_quarantined_credential_rejoins() {
        let pool = CredentialPool::new(
            "svc",
            AuthScheme::Bearer,
            ["key-one-1111", "key-two-2222"],
            Duration::from_secs(30),
        );

        let first = pool.next().await.unwrap();
        assert_eq!(first.index(), 0);
        for _ in 0..3 {
            pool.mark_failure(&first).await;
        }
        assert_eq!(pool.quarantined_count().await, 1);

        for _ in 0..3 {
            assert_eq!(pool.next().await.unwrap().index(), 1);
        }

        pool.mark_success(&first).await;
        assert_eq!(pool.quarantined_count().await, 0);
        assert_eq!(pool.next().await.unwrap().index(), 0);

        let stats = pool.stats().await;
        assert_eq!(stats[0].health, CredentialHealth::Healthy);
        assert_eq!(stats[0].success_count, 1);
        assert_eq!(stats[0].failure_count, 3);
        assert_eq!(stats[0].masked, "...1111");
    }

    /// A single-key service survives repeated auth failures through
    /// full-quarantine resets and recovers on success
    #[tokio::test(start_paused = true)]
    async fn test_dispatch_recovers_after_pool_resets() {
        let engine = ScriptedEngine::new([
            Err(EngineError::auth("401")),
            Err(EngineError::auth("401")),
            Err(EngineError::auth("401")),
            Ok("finally".to_string()),
        ]);
        let harness = Harness::new(engine, &["only-key-9999"], 10);

        let started = tokio::time::Instant::now();
        let content = harness
            .dispatcher
            .dispatch(&RequestSpec::generate(SERVICE, "prompt"), 4)
            .await
            .unwrap();
        assert_eq!(content, "finally");
        // Three resets, each waiting out the cool-down
        assert!(started.elapsed() >= Duration::from_secs(90));

        let pool = harness.pools.get(SERVICE).unwrap();
        assert_eq!(pool.quarantined_count().await, 0);
        assert_eq!(pool.len().await, 1);
        let stats = pool.stats().await;
        assert_eq!(stats[0].success_count, 1);
        assert_eq!(stats[0].total_failures, 3);
        assert_eq!(harness.dispatcher.metrics().attempts, 4);
    }
}

#[cfg(test)]
mod config_tests {
    use std::sync::Arc;

    use allocator::{AllocatorSettings, DestinationTarget, QuotaAllocator, RunOutcome};
    use config_loader::{ConfigFormat, ConfigLoader};
    use dispatcher::{BreakerHandle, PoolRegistry, RequestDispatcher};
    use engines::{DispatchingTranslator, LogSink, MockEngine};
    use scheduler::{ArticleRunnerFactory, ArticleSettings, BatchScheduler};

    use crate::support::backlog;

    const CONFIG: &str = r#"
default_service = "mock"

[breaker]
threshold = 10

[retry]
max_retries = 3
time_unit_ms = 10

[scheduler]
concurrency = 2
batch_size = 2
batch_pacing_ms = 0

[allocation]
per_destination_target = 2
seed = 9

[[allocation.destinations]]
id = "site-a"

[[allocation.destinations]]
id = "site-b"
target = 3
primary_language = "de"

[generation]
primary_language = "en"
languages = ["fr"]

[[services]]
name = "mock"
keys = ["mock-key-0001", "mock-key-0002"]
"#;

    /// Full stack assembled from a parsed configuration
    #[tokio::test(start_paused = true)]
    async fn test_config_driven_run() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();

        let pools = Arc::new(PoolRegistry::from_config(&config));
        let breaker = BreakerHandle::new(config.breaker.threshold);
        let engine = Arc::new(MockEngine::new(0.0).with_seed(9));
        let dispatcher =
            RequestDispatcher::from_retry_config(engine, pools.clone(), breaker.clone(), &config.retry);

        let settings = ArticleSettings::from_config(&config).unwrap();
        let translator = DispatchingTranslator::new(dispatcher.clone(), settings.service.clone());
        let factory = ArticleRunnerFactory::new(dispatcher.clone(), translator, settings);
        let scheduler = BatchScheduler::new(factory, breaker);

        let mut allocator = QuotaAllocator::new(
            scheduler,
            LogSink::new("log"),
            AllocatorSettings::from_config(&config),
        );
        let destinations = DestinationTarget::from_config(&config);
        assert_eq!(
            destinations,
            vec![
                DestinationTarget::new("site-a", 2),
                DestinationTarget::new("site-b", 3),
            ]
        );

        let stream = allocator.prepare(backlog(10));
        let summary = allocator.run(stream, &destinations).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Complete);
        assert_eq!(summary.total_delivered(), 5);
        // One generation plus one translation per artifact
        assert_eq!(dispatcher.metrics().successes, 10);

        let stats = pools.stats().await;
        assert_eq!(stats.len(), 2);
        assert_eq!(stats.iter().map(|s| s.success_count).sum::<u64>(), 10);
    }
}
