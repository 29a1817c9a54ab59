//! Per-worker task execution
//!
//! Every worker owns one runner built by a [`RunnerFactory`]. Runners share
//! pools and the breaker through their dispatcher clones.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use contracts::{
    Artifact, ContentEngine, DestinationId, RequestSpec, RunConfig, Task, TranslationEngine,
};
use dispatcher::{DispatchError, RequestDispatcher};

use crate::error::SchedulerError;

/// Executes one task to an artifact
#[trait_variant::make(TaskRunner: Send)]
pub trait LocalTaskRunner {
    /// # Errors
    /// The dispatch error of the failing call; never retries on its own.
    async fn run(&mut self, task: &Task) -> Result<Artifact, DispatchError>;
}

/// Builds one runner per worker
pub trait RunnerFactory: Send + Sync + 'static {
    type Runner: TaskRunner + Send + 'static;

    fn create(&self, worker_id: usize) -> Self::Runner;
}

impl<F, R> RunnerFactory for F
where
    F: Fn(usize) -> R + Send + Sync + 'static,
    R: TaskRunner + Send + 'static,
{
    type Runner = R;

    fn create(&self, worker_id: usize) -> R {
        self(worker_id)
    }
}

/// Generation settings shared by all article runners
#[derive(Debug, Clone)]
pub struct ArticleSettings {
    pub service: String,
    pub max_retries: u32,
    pub primary_language: String,
    /// Extra languages translated from the primary content
    pub languages: Vec<String>,
    /// Per-destination primary language overrides
    pub destination_languages: HashMap<DestinationId, String>,
}

impl ArticleSettings {
    pub fn from_config(config: &RunConfig) -> Result<Self, SchedulerError> {
        let service = config
            .generation_service()
            .ok_or(SchedulerError::NoGenerationService)?
            .to_string();

        let destination_languages = config
            .allocation
            .destinations
            .iter()
            .filter_map(|d| {
                d.primary_language
                    .as_ref()
                    .map(|lang| (d.id.clone(), lang.clone()))
            })
            .collect();

        Ok(Self {
            service,
            max_retries: config.retry.max_retries,
            primary_language: config.generation.primary_language.clone(),
            languages: config.generation.languages.clone(),
            destination_languages,
        })
    }

    pub fn primary_for(&self, destination: &DestinationId) -> &str {
        self.destination_languages
            .get(destination)
            .map(String::as_str)
            .unwrap_or(&self.primary_language)
    }
}

/// Generates the primary content, then each translation
pub struct ArticleRunner<E, T> {
    worker_id: usize,
    dispatcher: RequestDispatcher<E>,
    translator: T,
    settings: Arc<ArticleSettings>,
}

impl<E, T> ArticleRunner<E, T>
where
    E: ContentEngine + Send + Sync + 'static,
    T: TranslationEngine + Send + Sync,
{
    pub fn new(
        worker_id: usize,
        dispatcher: RequestDispatcher<E>,
        translator: T,
        settings: Arc<ArticleSettings>,
    ) -> Self {
        Self {
            worker_id,
            dispatcher,
            translator,
            settings,
        }
    }

    async fn translations(&self, content: &str, primary: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for lang in &self.settings.languages {
            if lang == primary {
                continue;
            }
            let text = match self.translator.translate(content, lang).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        worker = self.worker_id,
                        lang = %lang,
                        error = %e,
                        "Translation failed, keeping source text"
                    );
                    content.to_string()
                }
            };
            out.insert(lang.clone(), text);
        }
        out
    }
}

impl<E, T> TaskRunner for ArticleRunner<E, T>
where
    E: ContentEngine + Send + Sync + 'static,
    T: TranslationEngine + Send + Sync,
{
    #[instrument(
        name = "article_runner_run",
        skip(self, task),
        fields(worker = self.worker_id, task = %task.id, item = %task.item.id)
    )]
    async fn run(&mut self, task: &Task) -> Result<Artifact, DispatchError> {
        let primary = self.settings.primary_for(&task.destination).to_string();
        let prompt = if task.item.payload.is_empty() {
            task.item.title.clone()
        } else {
            task.item.payload.clone()
        };

        let spec = RequestSpec::generate(self.settings.service.clone(), prompt);
        let content = self
            .dispatcher
            .dispatch(&spec, self.settings.max_retries)
            .await?;
        debug!(bytes = content.len(), "Primary content generated");

        let translations = self.translations(&content, &primary).await;

        Ok(Artifact {
            item_id: task.item.id.clone(),
            title: task.item.title.clone(),
            primary_language: primary,
            content,
            translations,
        })
    }
}

/// Factory cloning a dispatcher and translator into each worker
pub struct ArticleRunnerFactory<E, T> {
    dispatcher: RequestDispatcher<E>,
    translator: T,
    settings: Arc<ArticleSettings>,
}

impl<E, T> ArticleRunnerFactory<E, T> {
    pub fn new(dispatcher: RequestDispatcher<E>, translator: T, settings: ArticleSettings) -> Self {
        Self {
            dispatcher,
            translator,
            settings: Arc::new(settings),
        }
    }
}

impl<E, T> RunnerFactory for ArticleRunnerFactory<E, T>
where
    E: ContentEngine + Send + Sync + 'static,
    T: TranslationEngine + Clone + Send + Sync + 'static,
{
    type Runner = ArticleRunner<E, T>;

    fn create(&self, worker_id: usize) -> Self::Runner {
        ArticleRunner::new(
            worker_id,
            self.dispatcher.clone(),
            self.translator.clone(),
            Arc::clone(&self.settings),
        )
    }
}
