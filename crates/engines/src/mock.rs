//! Local engines for `--mock` runs and tests

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use contracts::{AuthHeader, ContentEngine, EngineError, RequestKind, RequestSpec};

/// Fails a configurable share of calls, otherwise returns canned Markdown
pub struct MockEngine {
    failure_ratio: f64,
    latency: Duration,
    rng: Mutex<StdRng>,
}

impl MockEngine {
    /// `failure_ratio` is clamped to `0.0..=1.0`
    pub fn new(failure_ratio: f64) -> Self {
        Self {
            failure_ratio: failure_ratio.clamp(0.0, 1.0),
            latency: Duration::ZERO,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Simulated per-call latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Decide the outcome up front so the lock is never held across an await
    fn roll(&self) -> Option<EngineError> {
        let mut rng = self.rng.lock();
        if !rng.random_bool(self.failure_ratio) {
            return None;
        }
        Some(match rng.random_range(0..10) {
            0 => EngineError::from_status(401, "mock: invalid key"),
            1..=4 => EngineError::from_status(429, "mock: rate limited"),
            _ => EngineError::from_status(503, "mock: upstream unavailable"),
        })
    }
}

impl ContentEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        request: &RequestSpec,
        auth: &AuthHeader,
    ) -> Result<String, EngineError> {
        let failure = self.roll();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(err) = failure {
            debug!(auth = ?auth, error = %err, "Mock failure");
            return Err(err);
        }

        Ok(match &request.kind {
            RequestKind::Generate => format!(
                "# {}\n\nThis is a generated article about {}.\n",
                request.prompt, request.prompt
            ),
            RequestKind::Translate { target_lang } => {
                format!("<!-- {target_lang} -->\n{}", request.prompt)
            }
        })
    }
}

/// Replays a fixed script of outcomes, then a fallback
///
/// Records the credential value used for every call.
pub struct ScriptedEngine {
    script: Mutex<VecDeque<Result<String, EngineError>>>,
    fallback: Result<String, EngineError>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(script: impl IntoIterator<Item = Result<String, EngineError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: Err(EngineError::transient("script exhausted")),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// An engine that always fails with `err`
    pub fn always(err: EngineError) -> Self {
        Self::new([]).with_fallback(Err(err))
    }

    /// An engine that always succeeds, echoing the prompt
    pub fn echo() -> Self {
        Self::new([]).with_fallback(Ok(String::new()))
    }

    pub fn with_fallback(mut self, fallback: Result<String, EngineError>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Credential values seen so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl ContentEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: &RequestSpec,
        auth: &AuthHeader,
    ) -> Result<String, EngineError> {
        self.calls.lock().push(auth.value.clone());
        let next = self.script.lock().pop_front();
        match next.unwrap_or_else(|| self.fallback.clone()) {
            // empty success echoes the prompt
            Ok(text) if text.is_empty() => Ok(format!("generated: {}", request.prompt)),
            other => other,
        }
    }
}
