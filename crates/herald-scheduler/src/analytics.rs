//! Cache-or-fetch analytics for published posts.

use std::sync::Arc;

use chrono::Utc;
use herald_auth::TokenProvider;
use herald_platforms::AdapterRegistry;
use herald_store::{Platform, PostAnalytics, Store};
use tracing::{debug, info};

use crate::runner::Pipeline;
use crate::{InfrastructureError, PlatformError, RunnerConfig, ServiceError, Task, TaskQueue};

/// Result of one analytics fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Metrics were fetched and upserted.
    Stored(PostAnalytics),
    /// The platform call failed; nothing was written.
    Failed(PlatformError),
}

/// Fetches metrics from a platform and upserts them into the store.
#[derive(Clone)]
pub struct AnalyticsFetcher {
    pipeline: Pipeline,
}

impl AnalyticsFetcher {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: Arc<dyn TokenProvider>,
        adapters: AdapterRegistry,
        config: RunnerConfig,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                store,
                tokens,
                adapters,
                config,
            },
        }
    }

    /// Fetch and store analytics for one platform post.
    ///
    /// Platform failures are returned as [`FetchOutcome::Failed`]; only store
    /// failures are errors.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(
        &self,
        user_id: &str,
        platform: Platform,
        platform_post_id: &str,
    ) -> Result<FetchOutcome, InfrastructureError> {
        let metrics = match self.fetch_metrics(user_id, platform, platform_post_id).await {
            Ok(metrics) => metrics,
            Err(error) => return Ok(FetchOutcome::Failed(error)),
        };

        let record = PostAnalytics::new(user_id, platform, platform_post_id, metrics);
        let pipeline = &self.pipeline;
        let stored = pipeline
            .store_call("upsert_analytics", pipeline.store.upsert_analytics(&record))
            .await?;

        info!(metric_count = stored.metrics.len(), "analytics stored");
        Ok(FetchOutcome::Stored(stored))
    }

    async fn fetch_metrics(
        &self,
        user_id: &str,
        platform: Platform,
        platform_post_id: &str,
    ) -> Result<herald_store::Metrics, PlatformError> {
        let pipeline = &self.pipeline;
        let token = pipeline.token_for(user_id, platform).await?;
        let adapter = pipeline.adapters.require(platform)?;
        pipeline
            .platform_call(
                "fetch analytics",
                adapter.fetch_analytics(&token, platform_post_id),
            )
            .await
    }
}

/// Answer to an analytics request.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsLookup {
    /// Stored analytics. A refresh may have been queued if they were stale.
    Ready(PostAnalytics),
    /// Nothing stored yet; a fetch has been queued.
    Pending,
}

/// Serves analytics from the store, queueing fetches on a miss.
pub struct AnalyticsService {
    store: Arc<dyn Store>,
    queue: Arc<dyn TaskQueue>,
    max_age: Option<chrono::Duration>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            store,
            queue,
            max_age: None,
        }
    }

    /// Also queue a refresh when stored analytics are older than `max_age`.
    pub fn with_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Return stored analytics, or queue a fetch and report it pending.
    ///
    /// Never waits for the platform.
    #[tracing::instrument(skip(self))]
    pub async fn get_analytics(
        &self,
        user_id: &str,
        platform: Platform,
        platform_post_id: &str,
    ) -> Result<AnalyticsLookup, ServiceError> {
        let stored = self
            .store
            .find_analytics(user_id, platform, platform_post_id)
            .await?;

        match stored {
            Some(analytics) => {
                let now = Utc::now();
                if self.max_age.is_some_and(|age| analytics.is_stale(now, age)) {
                    debug!("stored analytics stale, queueing refresh");
                    self.queue
                        .submit(
                            Task::fetch_analytics(user_id, platform, platform_post_id),
                            now,
                        )
                        .await?;
                }
                Ok(AnalyticsLookup::Ready(analytics))
            }
            None => {
                debug!("no stored analytics, queueing fetch");
                self.queue
                    .submit(
                        Task::fetch_analytics(user_id, platform, platform_post_id),
                        Utc::now(),
                    )
                    .await?;
                Ok(AnalyticsLookup::Pending)
            }
        }
    }

    /// Look up analytics for every platform a post was published to.
    ///
    /// Returns `(platform, platform post id, lookup)` per published platform.
    pub async fn for_post(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<Vec<(Platform, String, AnalyticsLookup)>, ServiceError> {
        let post = self
            .store
            .find_post_for_user(post_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", post_id)))?;

        let mut lookups = Vec::new();
        for (platform, result) in post.post_results.unwrap_or_default() {
            let Some(platform_post_id) = result.post_id else {
                continue;
            };
            let lookup = self
                .get_analytics(user_id, platform, &platform_post_id)
                .await?;
            lookups.push((platform, platform_post_id, lookup));
        }
        Ok(lookups)
    }
}
