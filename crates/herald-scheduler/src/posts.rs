//! Scheduling and reading posts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use herald_store::{Platform, ScheduledPost, Store};
use tracing::{info, warn};

use crate::{ServiceError, Task, TaskQueue};

/// Largest page `list_posts` returns.
pub const MAX_PAGE_SIZE: usize = 100;

/// A request to publish content at a future time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    pub platforms: Vec<Platform>,
    pub text_content: Option<String>,
    pub media_urls: Vec<String>,
    pub scheduled_at: DateTime<Utc>,
}

/// Creates scheduled posts and serves them back to their owners.
pub struct PostService {
    store: Arc<dyn Store>,
    queue: Arc<dyn TaskQueue>,
}

impl PostService {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Persist a PENDING post and queue its publication.
    ///
    /// The post is stored before the task is queued. If queueing fails the
    /// post is still returned; reconciliation submits it later.
    #[tracing::instrument(skip(self, request), fields(platforms = request.platforms.len()))]
    pub async fn schedule_post(
        &self,
        user_id: &str,
        request: ScheduleRequest,
    ) -> Result<ScheduledPost, ServiceError> {
        if request.platforms.is_empty() {
            return Err(ServiceError::Validation(
                "at least one platform is required".to_string(),
            ));
        }
        let now = Utc::now();
        if request.scheduled_at <= now {
            return Err(ServiceError::Validation(
                "scheduled time must be in the future".to_string(),
            ));
        }

        let post = ScheduledPost::new(
            user_id,
            request.platforms,
            request.text_content,
            request.media_urls,
            request.scheduled_at,
        );
        self.store.insert_post(&post).await?;

        match self
            .queue
            .submit(Task::publish(&post.id), post.scheduled_at)
            .await
        {
            Ok(handle) => {
                info!(post_id = %post.id, run_at = %handle.run_at, "post scheduled");
            }
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "post stored but not queued");
            }
        }
        Ok(post)
    }

    /// A user's posts, newest scheduled time first.
    pub async fn list_posts(
        &self,
        user_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, ServiceError> {
        let limit = limit.min(MAX_PAGE_SIZE);
        Ok(self
            .store
            .list_posts_for_user(user_id, skip, limit)
            .await?)
    }

    /// One of the user's posts.
    pub async fn get_post(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<ScheduledPost, ServiceError> {
        self.store
            .find_post_for_user(post_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", post_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SchedulerError, SubmissionHandle};
    use async_trait::async_trait;
    use herald_store::{MemoryStore, PostStatus};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Queue that records submissions, or refuses them all.
    #[derive(Default)]
    struct StubQueue {
        submitted: Mutex<Vec<(Task, DateTime<Utc>)>>,
        closed: bool,
    }

    #[async_trait]
    impl TaskQueue for StubQueue {
        async fn submit(
            &self,
            task: Task,
            run_at: DateTime<Utc>,
        ) -> Result<SubmissionHandle, SchedulerError> {
            if self.closed {
                return Err(SchedulerError::ShutDown);
            }
            let key = task.key();
            self.submitted.lock().unwrap().push((task, run_at));
            Ok(SubmissionHandle { key, run_at })
        }

        async fn is_tracked(&self, _key: &str) -> bool {
            false
        }
    }

    fn request(platforms: Vec<Platform>, in_minutes: i64) -> ScheduleRequest {
        ScheduleRequest {
            platforms,
            text_content: Some("hello".to_string()),
            media_urls: vec![],
            scheduled_at: Utc::now() + chrono::Duration::minutes(in_minutes),
        }
    }

    #[tokio::test]
    async fn test_schedule_persists_then_queues() {
        let store = MemoryStore::new();
        let queue = Arc::new(StubQueue::default());
        let service = PostService::new(store.clone(), queue.clone());

        let post = service
            .schedule_post("u1", request(vec![Platform::Facebook], 10))
            .await
            .unwrap();

        assert_eq!(post.status, PostStatus::Pending);
        assert!(post.post_results.is_none());
        assert_eq!(store.post_count(), 1);
        let submitted = queue.submitted.lock().unwrap().clone();
        assert_eq!(submitted, vec![(Task::publish(&post.id), post.scheduled_at)]);
    }

    #[tokio::test]
    async fn test_past_time_rejected_without_write() {
        let store = MemoryStore::new();
        let queue = Arc::new(StubQueue::default());
        let service = PostService::new(store.clone(), queue.clone());

        let result = service
            .schedule_post("u1", request(vec![Platform::Facebook], -1))
            .await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert_eq!(store.post_count(), 0);
        assert!(queue.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_platforms_rejected() {
        let store = MemoryStore::new();
        let service = PostService::new(store.clone(), Arc::new(StubQueue::default()));

        let result = service.schedule_post("u1", request(vec![], 10)).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert_eq!(store.post_count(), 0);
    }

    #[tokio::test]
    async fn test_queue_failure_still_persists() {
        let store = MemoryStore::new();
        let queue = Arc::new(StubQueue {
            closed: true,
            ..StubQueue::default()
        });
        let service = PostService::new(store.clone(), queue);

        let post = service
            .schedule_post("u1", request(vec![Platform::Instagram], 10))
            .await
            .unwrap();
        assert_eq!(service.get_post("u1", &post.id).await.unwrap().id, post.id);
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let store = MemoryStore::new();
        let service = PostService::new(store, Arc::new(StubQueue::default()));
        let post = service
            .schedule_post("u1", request(vec![Platform::Facebook], 10))
            .await
            .unwrap();

        assert!(matches!(
            service.get_post("u2", &post.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(service.list_posts("u2", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_newest_first_and_clamped() {
        let store = MemoryStore::new();
        let service = PostService::new(store, Arc::new(StubQueue::default()));
        for minutes in [10, 30, 20] {
            service
                .schedule_post("u1", request(vec![Platform::Facebook], minutes))
                .await
                .unwrap();
        }

        let posts = service.list_posts("u1", 0, usize::MAX).await.unwrap();
        assert_eq!(posts.len(), 3);
        assert!(posts[0].scheduled_at > posts[1].scheduled_at);
        assert!(posts[1].scheduled_at > posts[2].scheduled_at);

        let page = service.list_posts("u1", 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, posts[1].id);
    }
}
