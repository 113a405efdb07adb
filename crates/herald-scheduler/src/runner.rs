//! Execution of one scheduled post.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use herald_auth::TokenProvider;
use herald_platforms::{AdapterRegistry, PostContent};
use herald_store::{
    Platform, PostPatch, PostResult, PostResults, PostStatus, ScheduledPost, Store, StoreError,
};
use tracing::{debug, info, warn};

use crate::{InfrastructureError, PlatformError};

/// Recorded when a platform accepts a post but reports no id.
pub const MISSING_POST_ID_ERROR: &str = "post succeeded but platform id missing";

/// How a publish that returns no platform id affects the post status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingIdPolicy {
    /// Record a failed platform result but leave the post POSTED.
    Soft,
    /// Treat the missing id like any other platform failure.
    Fatal,
}

/// The platform most likely did publish, so the post is not marked failed.
pub const DEFAULT_MISSING_ID_POLICY: MissingIdPolicy = MissingIdPolicy::Soft;

/// Time bounds and policies for pipeline runs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Bound on each token resolution and adapter call.
    pub call_timeout: Duration,
    /// Bound on each store read or write.
    pub store_timeout: Duration,
    pub missing_id: MissingIdPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(10),
            missing_id: DEFAULT_MISSING_ID_POLICY,
        }
    }
}

/// Final state written for a post.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub status: PostStatus,
    pub results: PostResults,
}

/// Result of running a post.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No post with that id; nothing was written.
    NotFound,
    /// The post was executed and its outcome persisted.
    Completed(RunSummary),
}

/// Dependencies shared by the runner and the analytics fetcher.
#[derive(Clone)]
pub(crate) struct Pipeline {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) tokens: Arc<dyn TokenProvider>,
    pub(crate) adapters: AdapterRegistry,
    pub(crate) config: RunnerConfig,
}

impl Pipeline {
    /// Run a store call under the store timeout.
    pub(crate) async fn store_call<T, F>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<T, InfrastructureError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(InfrastructureError::Timeout {
                operation,
                after: self.config.store_timeout,
            }),
        }
    }

    /// Run a token or adapter call under the call timeout.
    pub(crate) async fn platform_call<T, E, F>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<T, PlatformError>
    where
        F: Future<Output = Result<T, E>>,
        PlatformError: From<E>,
    {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PlatformError::Timeout {
                operation,
                after: self.config.call_timeout,
            }),
        }
    }

    /// Resolve the user's token for a platform; absence is a platform error.
    pub(crate) async fn token_for(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<herald_platforms::AccessToken, PlatformError> {
        self.platform_call("token resolution", self.tokens.resolve(user_id, platform))
            .await?
            .ok_or(PlatformError::TokenMissing)
    }
}

/// Publishes a scheduled post to each of its platforms and records the outcome.
#[derive(Clone)]
pub struct JobRunner {
    pipeline: Pipeline,
}

impl JobRunner {
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

    pub fn config(&self) -> &RunnerConfig {
        &self.pipeline.config
    }

    /// Run the post with the given id.
    ///
    /// Platforms are published sequentially in the post's order. Every
    /// platform gets exactly one result; the post's status and results are
    /// then written in one update. Only store failures are returned as errors.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, post_id: &str) -> Result<RunOutcome, InfrastructureError> {
        let pipeline = &self.pipeline;
        let Some(post) = pipeline
            .store_call("find_post", pipeline.store.find_post(post_id))
            .await?
        else {
            warn!(post_id, "scheduled post not found");
            return Ok(RunOutcome::NotFound);
        };

        if post.status.is_terminal() {
            debug!(post_id, status = %post.status, "re-running post with terminal status");
        }

        let summary = self.execute(&post).await;

        let patch = PostPatch {
            status: summary.status,
            post_results: summary.results.clone(),
            updated_at: Utc::now(),
        };
        pipeline
            .store_call("update_post", pipeline.store.update_post(post_id, &patch))
            .await?;

        info!(
            post_id,
            user_id = %post.user_id,
            status = %summary.status,
            platforms = post.platforms.len(),
            "scheduled post executed"
        );
        Ok(RunOutcome::Completed(summary))
    }

    /// Publish to every platform and aggregate the results.
    async fn execute(&self, post: &ScheduledPost) -> RunSummary {
        let content = PostContent::from(post);
        let mut results = PostResults::new();
        let mut failed = false;

        for &platform in &post.platforms {
            let outcome = self.publish_to(&post.user_id, platform, &content).await;
            let now = Utc::now();

            let result = match outcome {
                Ok(Some(platform_post_id)) => {
                    info!(post_id = %post.id, %platform, %platform_post_id, "published");
                    PostResult::published(platform_post_id, now)
                }
                Ok(None) => {
                    warn!(post_id = %post.id, %platform, "platform accepted post without an id");
                    if self.pipeline.config.missing_id == MissingIdPolicy::Fatal {
                        failed = true;
                    }
                    PostResult::failed(MISSING_POST_ID_ERROR, now)
                }
                Err(error) => {
                    warn!(post_id = %post.id, %platform, error = %error, "publish failed");
                    failed = true;
                    PostResult::failed(error.to_string(), now)
                }
            };
            results.insert(platform, result);
        }

        RunSummary {
            status: if failed {
                PostStatus::Failed
            } else {
                PostStatus::Posted
            },
            results,
        }
    }

    /// Publish to one platform, returning the platform's post id if it gave one.
    async fn publish_to(
        &self,
        user_id: &str,
        platform: Platform,
        content: &PostContent,
    ) -> Result<Option<String>, PlatformError> {
        let pipeline = &self.pipeline;
        let token = pipeline.token_for(user_id, platform).await?;
        let adapter = pipeline.adapters.require(platform)?;
        let receipt = pipeline
            .platform_call("publish", adapter.publish(&token, content))
            .await?;
        Ok(receipt.post_id.filter(|id| !id.is_empty()))
    }
}
