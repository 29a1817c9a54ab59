//! CredentialPool - per-service round-robin credential rotation
//!
//! Quarantined credentials are skipped. When every credential is
//! quarantined the pool resets itself and makes the caller wait out a
//! global cool-down before handing out the first credential again.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use contracts::{
    mask_secret, AuthHeader, AuthScheme, CredentialHealth, CredentialStats, RunConfig,
};

use crate::error::DispatchError;

/// Borrowed view of one credential, handed to a single attempt
#[derive(Clone)]
pub struct CredentialLease {
    index: usize,
    secret: Arc<str>,
}

impl CredentialLease {
    /// Position in the pool
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn masked(&self) -> String {
        mask_secret(&self.secret)
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLease")
            .field("index", &self.index)
            .field("secret", &self.masked())
            .finish()
    }
}

#[derive(Debug)]
struct Credential {
    secret: Arc<str>,
    success_count: u64,
    failure_count: u64,
    total_failures: u64,
    last_used: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct PoolState {
    credentials: Vec<Credential>,
    cursor: usize,
    quarantined: BTreeSet<usize>,
}

impl PoolState {
    fn lease(&mut self, index: usize) -> CredentialLease {
        let cred = &mut self.credentials[index];
        cred.last_used = Some(Utc::now());
        CredentialLease {
            index,
            secret: Arc::clone(&cred.secret),
        }
    }

    /// Clear the quarantine set and per-cycle failure counters
    fn reset(&mut self) {
        self.quarantined.clear();
        for cred in &mut self.credentials {
            cred.failure_count = 0;
        }
        self.cursor = 0;
    }
}

/// Rotating credential set for one service
pub struct CredentialPool {
    service: String,
    auth: AuthScheme,
    cooldown: Duration,
    state: Mutex<PoolState>,
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("service", &self.service)
            .field("auth", &self.auth)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl CredentialPool {
    /// Create a pool from secrets, preserving their order
    pub fn new<I, S>(service: impl Into<String>, auth: AuthScheme, secrets: I, cooldown: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let credentials = secrets
            .into_iter()
            .map(|s| Credential {
                secret: Arc::from(s.as_ref()),
                success_count: 0,
                failure_count: 0,
                total_failures: 0,
                last_used: None,
            })
            .collect();

        Self {
            service: service.into(),
            auth,
            cooldown,
            state: Mutex::new(PoolState {
                credentials,
                cursor: 0,
                quarantined: BTreeSet::new(),
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        self.auth
    }

    /// Header carrying the leased secret under this service's scheme
    pub fn auth_header(&self, lease: &CredentialLease) -> AuthHeader {
        self.auth.header_for(lease.secret())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.credentials.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn quarantined_count(&self) -> usize {
        self.state.lock().await.quarantined.len()
    }

    /// Next healthy credential in round-robin order
    ///
    /// Blocks for the cool-down when every credential is quarantined. The
    /// pool lock is held across the wait so concurrent callers share it.
    ///
    /// # Errors
    /// `PoolExhausted` only when the pool holds no credentials.
    #[instrument(name = "credential_pool_next", skip(self), fields(service = %self.service))]
    pub async fn next(&self) -> Result<CredentialLease, DispatchError> {
        let mut state = self.state.lock().await;
        let len = state.credentials.len();
        if len == 0 {
            return Err(DispatchError::pool_exhausted(&self.service));
        }

        if state.quarantined.len() >= len {
            warn!(
                service = %self.service,
                credentials = len,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "All credentials quarantined, resetting pool after cool-down"
            );
            state.reset();
            observability::record_pool_cooldown(&self.service);
            tokio::time::sleep(self.cooldown).await;
            state.cursor = 1 % len;
            return Ok(state.lease(0));
        }

        for _ in 0..len {
            let index = state.cursor % len;
            state.cursor = (index + 1) % len;
            if !state.quarantined.contains(&index) {
                debug!(service = %self.service, index, "Credential leased");
                return Ok(state.lease(index));
            }
        }

        // quarantined.len() < len guarantees a healthy slot above
        Err(DispatchError::pool_exhausted(&self.service))
    }

    /// Record a successful call; lifts quarantine if present
    pub async fn mark_success(&self, lease: &CredentialLease) {
        let mut state = self.state.lock().await;
        let Some(cred) = state.credentials.get_mut(lease.index) else {
            return;
        };
        cred.success_count += 1;
        if state.quarantined.remove(&lease.index) {
            info!(
                service = %self.service,
                credential = %lease.masked(),
                "Credential recovered from quarantine"
            );
        }
    }

    /// Record a failed call and quarantine the credential
    pub async fn mark_failure(&self, lease: &CredentialLease) {
        let mut state = self.state.lock().await;
        let Some(cred) = state.credentials.get_mut(lease.index) else {
            return;
        };
        cred.failure_count += 1;
        cred.total_failures += 1;
        let failures = cred.failure_count;
        if state.quarantined.insert(lease.index) {
            observability::record_credential_quarantined(&self.service);
            warn!(
                service = %self.service,
                credential = %lease.masked(),
                failures,
                quarantined = state.quarantined.len(),
                "Credential quarantined"
            );
        }
    }

    /// Per-credential statistics snapshot
    pub async fn stats(&self) -> Vec<CredentialStats> {
        let state = self.state.lock().await;
        state
            .credentials
            .iter()
            .enumerate()
            .map(|(index, cred)| CredentialStats {
                index,
                service: self.service.clone(),
                masked: mask_secret(&cred.secret),
                health: if state.quarantined.contains(&index) {
                    CredentialHealth::Quarantined
                } else {
                    CredentialHealth::Healthy
                },
                success_count: cred.success_count,
                failure_count: cred.failure_count,
                total_failures: cred.total_failures,
                last_used: cred.last_used,
            })
            .collect()
    }
}

/// Service name -> credential pool
#[derive(Debug, Default, Clone)]
pub struct PoolRegistry {
    pools: HashMap<String, Arc<CredentialPool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One pool per configured service
    pub fn from_config(config: &RunConfig) -> Self {
        let cooldown = config.cooldown();
        let mut registry = Self::new();
        for service in &config.services {
            registry.insert(CredentialPool::new(
                service.name.clone(),
                service.auth,
                service.keys.iter().filter(|k| !k.trim().is_empty()),
                cooldown,
            ));
        }
        registry
    }

    pub fn insert(&mut self, pool: CredentialPool) {
        self.pools.insert(pool.service().to_string(), Arc::new(pool));
    }

    pub fn get(&self, service: &str) -> Result<Arc<CredentialPool>, DispatchError> {
        self.pools
            .get(service)
            .cloned()
            .ok_or_else(|| DispatchError::unknown_service(service))
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// Statistics for every pool, ordered by service name
    pub async fn stats(&self) -> Vec<CredentialStats> {
        let mut names: Vec<&String> = self.pools.keys().collect();
        names.sort();
        let mut out = Vec::new();
        for name in names {
            if let Some(pool) = self.pools.get(name) {
                out.extend(pool.stats().await);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pool(secrets: &[&str]) -> CredentialPool {
        CredentialPool::new(
            "svc",
            AuthScheme::Bearer,
            secrets.iter().copied(),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_round_robin_order() {
        let pool = pool(&["k0", "k1", "k2"]);
        let order: Vec<usize> = {
            let mut v = Vec::new();
            for _ in 0..6 {
                v.push(pool.next().await.unwrap().index());
            }
            v
        };
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2]);
    }

    #[tokio::test]
    async fn test_quarantined_skipped() {
        let pool = pool(&["k0", "k1", "k2"]);
        let first = pool.next().await.unwrap();
        pool.mark_failure(&first).await;

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(pool.next().await.unwrap().index());
        }
        assert_eq!(seen, vec![1, 2, 1, 2]);
        assert_eq!(pool.quarantined_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_pool_is_exhausted() {
        let pool = pool(&[]);
        let err = pool.next().await.unwrap_err();
        assert!(matches!(err, DispatchError::PoolExhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_quarantine_resets_after_cooldown() {
        let pool = pool(&["k0", "k1"]);
        for _ in 0..2 {
            let lease = pool.next().await.unwrap();
            pool.mark_failure(&lease).await;
        }
        assert_eq!(pool.quarantined_count().await, 2);

        let start = tokio::time::Instant::now();
        let lease = pool.next().await.unwrap();
        assert_eq!(lease.index(), 0);
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert_eq!(pool.quarantined_count().await, 0);
        assert_eq!(pool.len().await, 2);

        // Cursor continues after the first credential
        assert_eq!(pool.next().await.unwrap().index(), 1);

        let stats = pool.stats().await;
        assert!(stats.iter().all(|s| s.failure_count == 0));
        assert!(stats.iter().all(|s| s.total_failures == 1));
    }

    #[tokio::test]
    async fn test_success_lifts_quarantine() {
        let pool = pool(&["k0", "k1"]);
        let lease = pool.next().await.unwrap();
        pool.mark_failure(&lease).await;
        assert_eq!(pool.stats().await[0].health, CredentialHealth::Quarantined);

        pool.mark_success(&lease).await;
        let stats = pool.stats().await;
        assert_eq!(stats[0].health, CredentialHealth::Healthy);
        assert_eq!(stats[0].success_count, 1);
        assert!(stats[0].last_used.is_some());
    }

    #[tokio::test]
    async fn test_registry_from_config() {
        let config: RunConfig = groq_config();
        let registry = PoolRegistry::from_config(&config);
        let pool = registry.get("groq").unwrap();
        assert_eq!(pool.len().await, 2);
        assert_eq!(pool.auth_scheme(), AuthScheme::XApiKey);
        assert!(matches!(
            registry.get("missing"),
            Err(DispatchError::UnknownService { .. })
        ));
    }

    fn groq_config() -> RunConfig {
        let mut config = RunConfig::default();
        config.services = vec![contracts::ServiceConfig {
            name: "groq".into(),
            format: Default::default(),
            endpoint: String::new(),
            model: String::new(),
            auth: AuthScheme::XApiKey,
            timeout_secs: 60,
            headers: Default::default(),
            keys: vec!["a".into(), " ".into(), "b".into()],
            keys_env: None,
            sampling: Default::default(),
        }];
        config
    }

    #[test]
    fn test_lease_debug_masks_secret() {
        let lease = CredentialLease {
            index: 0,
            secret: Arc::from("sk-very-secret-1234"),
        };
        let dbg = format!("{lease:?}");
        assert!(!dbg.contains("very-secret"));
    }

    proptest! {
        /// After any failure pattern, the pool still yields a credential and keeps its size
        #[test]
        fn prop_pool_never_shrinks(k in 1usize..6, failures in proptest::collection::vec(any::<bool>(), 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let secrets: Vec<String> = (0..k).map(|i| format!("key-{i}")).collect();
                let pool = CredentialPool::new("svc", AuthScheme::Bearer, &secrets, Duration::from_secs(30));
                for fail in failures {
                    let lease = pool.next().await.unwrap();
                    if fail {
                        pool.mark_failure(&lease).await;
                    } else {
                        pool.mark_success(&lease).await;
                    }
                }
                assert!(pool.next().await.is_ok());
                assert_eq!(pool.len().await, k);
            });
        }
    }
}
