//! Task handlers: what the scheduler actually runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use herald_store::{PostPatch, PostResult, PostResults, PostStatus, Store};
use tracing::{error, info, warn};

use crate::{AnalyticsFetcher, FetchOutcome, JobRunner, RunOutcome, Task, TaskError};

/// Executes tasks on behalf of the scheduler.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run one attempt of `task`.
    async fn handle(&self, task: &Task) -> Result<(), TaskError>;

    /// Called once after the final failed attempt of a task.
    async fn on_exhausted(&self, _task: &Task, _error: &TaskError) {}
}

/// What happens to a post whose publish task ran out of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Leave the post PENDING; reconciliation picks it up again later.
    LeavePending,
    /// Mark the post FAILED with an error result for every platform.
    MarkFailed,
}

/// Exhausted posts stay pending so a later reconciliation can still publish them.
pub const DEFAULT_EXHAUSTION_POLICY: ExhaustionPolicy = ExhaustionPolicy::LeavePending;

/// Routes publish tasks to the [`JobRunner`] and analytics tasks to the
/// [`AnalyticsFetcher`].
pub struct PipelineHandler {
    runner: JobRunner,
    fetcher: AnalyticsFetcher,
    store: Arc<dyn Store>,
    exhaustion: ExhaustionPolicy,
}

impl PipelineHandler {
    pub fn new(
        runner: JobRunner,
        fetcher: AnalyticsFetcher,
        store: Arc<dyn Store>,
        exhaustion: ExhaustionPolicy,
    ) -> Self {
        Self {
            runner,
            fetcher,
            store,
            exhaustion,
        }
    }

    /// Write a FAILED outcome for a post whose publish retries are spent.
    async fn mark_failed(&self, post_id: &str, error: &TaskError) {
        let post = match self.store.find_post(post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => return,
            Err(e) => {
                error!(post_id, error = %e, "could not load exhausted post");
                return;
            }
        };

        if post.status != PostStatus::Pending {
            return;
        }

        let now = Utc::now();
        let message = format!("publish retries exhausted: {}", error);
        let post_results: PostResults = post
            .platforms
            .iter()
            .map(|&platform| (platform, PostResult::failed(message.clone(), now)))
            .collect();
        let patch = PostPatch {
            status: PostStatus::Failed,
            post_results,
            updated_at: now,
        };

        match self.store.update_post(post_id, &patch).await {
            Ok(()) => info!(post_id, "exhausted post marked failed"),
            Err(e) => error!(post_id, error = %e, "could not mark exhausted post failed"),
        }
    }
}

#[async_trait]
impl TaskHandler for PipelineHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        match task {
            Task::PublishPost { post_id } => match self.runner.run(post_id).await? {
                RunOutcome::NotFound => {
                    warn!(post_id = %post_id, "dropping publish task for missing post");
                    Ok(())
                }
                RunOutcome::Completed(_) => Ok(()),
            },
            Task::FetchAnalytics {
                user_id,
                platform,
                platform_post_id,
            } => {
                match self
                    .fetcher
                    .fetch(user_id, *platform, platform_post_id)
                    .await?
                {
                    FetchOutcome::Stored(_) => {}
                    FetchOutcome::Failed(error) => {
                        warn!(
                            user_id = %user_id,
                            platform = %platform,
                            platform_post_id = %platform_post_id,
                            error = %error,
                            "analytics fetch failed"
                        );
                    }
                }
                Ok(())
            }
        }
    }

    async fn on_exhausted(&self, task: &Task, error: &TaskError) {
        match (task, self.exhaustion) {
            (Task::PublishPost { post_id }, ExhaustionPolicy::MarkFailed) => {
                self.mark_failed(post_id, error).await;
            }
            (Task::PublishPost { post_id }, ExhaustionPolicy::LeavePending) => {
                error!(post_id = %post_id, error = %error, "publish retries exhausted, post left pending");
            }
            (Task::FetchAnalytics { .. }, _) => {
                error!(task = %task, error = %error, "analytics retries exhausted");
            }
        }
    }
}
