//! Translation engines

use tracing::debug;

use contracts::{ContentEngine, EngineError, RequestSpec, TranslationEngine};
use dispatcher::{DispatchError, RequestDispatcher};

/// Returns the source text unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl TranslationEngine for IdentityTranslator {
    async fn translate(&self, text: &str, _target_lang: &str) -> Result<String, EngineError> {
        Ok(text.to_string())
    }
}

/// Routes translation through a service's credential pool, single attempt
pub struct DispatchingTranslator<E> {
    dispatcher: RequestDispatcher<E>,
    service: String,
}

impl<E> Clone for DispatchingTranslator<E> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            service: self.service.clone(),
        }
    }
}

impl<E> DispatchingTranslator<E>
where
    E: ContentEngine + Send + Sync + 'static,
{
    pub fn new(dispatcher: RequestDispatcher<E>, service: impl Into<String>) -> Self {
        Self {
            dispatcher,
            service: service.into(),
        }
    }
}

impl<E> TranslationEngine for DispatchingTranslator<E>
where
    E: ContentEngine + Send + Sync + 'static,
{
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, EngineError> {
        let spec = RequestSpec::translate(self.service.clone(), text, target_lang);
        self.dispatcher
            .dispatch(&spec, 1)
            .await
            .map_err(|e| {
                debug!(lang = target_lang, error = %e, "Translation dispatch failed");
                into_engine_error(e)
            })
    }
}

/// Last attempt's classification, or transient for non-attempt failures
fn into_engine_error(error: DispatchError) -> EngineError {
    match error.history().last() {
        Some(last) => EngineError {
            kind: last.kind,
            message: last.message.clone(),
            status: None,
        },
        None => EngineError::transient(error.to_string()),
    }
}
