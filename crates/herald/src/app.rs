//! Component wiring shared by the daemon and the one-shot commands.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_auth::{AccountLinker, StoredTokenProvider, TokenProvider};
use herald_platforms::{AdapterMode, AdapterRegistry};
use herald_scheduler::{
    AnalyticsFetcher, AnalyticsService, JobRunner, PipelineHandler, PostService, Scheduler,
    SchedulerError, SubmissionHandle, Task, TaskQueue,
};
use herald_store::{FileStore, MemoryStore, Store};
use miette::Result;
use tracing::{debug, info};

use crate::autoreply::AutoReplyService;
use crate::config::{Settings, StoreBackend};
use crate::content::{ContentService, OpenAiGenerator, TextGenerator};

/// Queue for processes that do not run a scheduler.
///
/// Posts stay PENDING in the shared store; the daemon's reconciler submits
/// them once they fall inside its lookahead.
pub struct DaemonHandoff;

#[async_trait]
impl TaskQueue for DaemonHandoff {
    async fn submit(
        &self,
        task: Task,
        run_at: DateTime<Utc>,
    ) -> Result<SubmissionHandle, SchedulerError> {
        debug!(task = %task, "leaving task to the daemon");
        Ok(SubmissionHandle {
            key: task.key(),
            run_at,
        })
    }

    async fn is_tracked(&self, _key: &str) -> bool {
        false
    }
}

/// Opened store, credentials and adapters.
pub struct App {
    pub settings: Settings,
    pub store: Arc<dyn Store>,
    pub tokens: Arc<dyn TokenProvider>,
    pub adapters: AdapterRegistry,
    pub generator: Option<Arc<dyn TextGenerator>>,
}

impl App {
    pub async fn open(settings: Settings) -> Result<Self> {
        let store: Arc<dyn Store> = match settings.store {
            StoreBackend::File => {
                let root = settings.data_dir();
                let store = FileStore::open(&root)
                    .await
                    .map_err(|e| miette::miette!("failed to open store at {}: {}", root.display(), e))?;
                debug!(root = %root.display(), "file store opened");
                Arc::new(store)
            }
            StoreBackend::Memory => MemoryStore::new(),
        };

        let adapters = match settings.adapter_mode {
            AdapterMode::Stub => AdapterRegistry::stub(),
            AdapterMode::Live => AdapterRegistry::live(
                settings.facebook_graph_url.as_deref(),
                settings.instagram_graph_url.as_deref(),
                settings.call_timeout(),
            )
            .map_err(|e| miette::miette!("failed to create platform clients: {}", e))?,
        };

        let generator: Option<Arc<dyn TextGenerator>> = match &settings.generator_api_key {
            Some(key) if !key.is_empty() => {
                let generator = OpenAiGenerator::new(
                    &settings.generator_url,
                    key.clone(),
                    settings.generator_model.clone(),
                    settings.generator_timeout(),
                )
                .map_err(|e| miette::miette!("failed to create text generator: {}", e))?;
                Some(Arc::new(generator))
            }
            _ => None,
        };

        let tokens: Arc<dyn TokenProvider> =
            Arc::new(StoredTokenProvider::new(Arc::clone(&store)));

        Ok(Self {
            settings,
            store,
            tokens,
            adapters,
            generator,
        })
    }

    /// A scheduler running the publishing pipeline. Not started.
    pub fn scheduler(&self) -> Arc<Scheduler> {
        let runner_config = self.settings.runner_config();
        let runner = JobRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&self.tokens),
            self.adapters.clone(),
            runner_config.clone(),
        );
        let fetcher = AnalyticsFetcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.tokens),
            self.adapters.clone(),
            runner_config,
        );
        let handler = PipelineHandler::new(
            runner,
            fetcher,
            Arc::clone(&self.store),
            self.settings.exhaustion_policy.into(),
        );
        info!(
            platforms = ?self.adapters.platforms(),
            mode = %self.settings.adapter_mode,
            "publishing pipeline ready"
        );
        Scheduler::new(Arc::new(handler), self.settings.scheduler_config())
    }

    pub fn post_service(&self, queue: Arc<dyn TaskQueue>) -> PostService {
        PostService::new(Arc::clone(&self.store), queue)
    }

    pub fn analytics_service(&self, queue: Arc<dyn TaskQueue>) -> AnalyticsService {
        let service = AnalyticsService::new(Arc::clone(&self.store), queue);
        match self.settings.analytics_max_age() {
            Some(max_age) => service.with_max_age(max_age),
            None => service,
        }
    }

    pub fn content_service(&self) -> ContentService {
        ContentService::new(Arc::clone(&self.store), self.generator.clone())
    }

    pub fn auto_reply_service(&self) -> AutoReplyService {
        AutoReplyService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.tokens),
            self.adapters.clone(),
            self.generator.clone(),
        )
    }

    pub fn linker(&self) -> AccountLinker {
        AccountLinker::new(Arc::clone(&self.store))
    }
}
