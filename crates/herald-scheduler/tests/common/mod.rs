//! Shared fakes for the pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_auth::{TokenError, TokenProvider};
use herald_platforms::{AccessToken, AdapterError, PlatformAdapter, PostContent, PublishReceipt};
use herald_scheduler::WallClock;
use herald_store::{
    AnalyticsStore, AutoReplyConfig, AutoReplyStore, ContentStore, GeneratedContent, JobStore,
    MemoryStore, Metrics, Platform, PostAnalytics, PostPatch, PostStatus, Provider,
    ScheduledPost, StoreError, StoredToken, TokenStore, User, UserStore,
};

// Token provider holding "<platform>-token" for each linked (user, platform)
#[derive(Default)]
pub struct Tokens {
    linked: Mutex<HashSet<(String, Platform)>>,
}

impl Tokens {
    pub fn linked(entries: &[(&str, Platform)]) -> Arc<Self> {
        let linked = entries
            .iter()
            .map(|(user, platform)| (user.to_string(), *platform))
            .collect();
        Arc::new(Self {
            linked: Mutex::new(linked),
        })
    }
}

#[async_trait]
impl TokenProvider for Tokens {
    async fn resolve(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<AccessToken>, TokenError> {
        let linked = self
            .linked
            .lock()
            .unwrap()
            .contains(&(user_id.to_string(), platform));
        Ok(linked.then(|| AccessToken::new(format!("{}-token", platform))))
    }
}

// How a scripted adapter answers publish calls
#[derive(Debug, Clone)]
pub enum Reply {
    Id(String),
    NoId,
    Fail(String),
}

// Adapter that answers every publish with the same scripted reply
pub struct ScriptedAdapter {
    platform: Platform,
    reply: Reply,
    pub publishes: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(platform: Platform, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            platform,
            reply,
            publishes: AtomicUsize::new(0),
        })
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(
        &self,
        _token: &AccessToken,
        _content: &PostContent,
    ) -> Result<PublishReceipt, AdapterError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Id(id) => Ok(PublishReceipt::with_id(id.clone())),
            Reply::NoId => Ok(PublishReceipt::without_id()),
            Reply::Fail(message) => Err(AdapterError::validation(message.clone())),
        }
    }

    async fn fetch_analytics(
        &self,
        _token: &AccessToken,
        platform_post_id: &str,
    ) -> Result<Metrics, AdapterError> {
        let mut metrics = Metrics::new();
        metrics.insert("id".to_string(), platform_post_id.into());
        Ok(metrics)
    }
}

// Store that fails the first `failures` post updates, delegating everything else
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    failures: AtomicUsize,
    pub update_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_updates(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(failures),
            update_attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn insert_post(&self, post: &ScheduledPost) -> Result<String, StoreError> {
        self.inner.insert_post(post).await
    }

    async fn find_post(&self, id: &str) -> Result<Option<ScheduledPost>, StoreError> {
        self.inner.find_post(id).await
    }

    async fn list_posts_for_user(
        &self,
        user_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        self.inner.list_posts_for_user(user_id, skip, limit).await
    }

    async fn update_post(&self, id: &str, patch: &PostPatch) -> Result<(), StoreError> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        self.inner.update_post(id, patch).await
    }

    async fn find_due(
        &self,
        status: PostStatus,
        before: DateTime<Utc>,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        self.inner.find_due(status, before).await
    }
}

#[async_trait]
impl AnalyticsStore for FlakyStore {
    async fn find_analytics(
        &self,
        user_id: &str,
        platform: Platform,
        platform_post_id: &str,
    ) -> Result<Option<PostAnalytics>, StoreError> {
        self.inner
            .find_analytics(user_id, platform, platform_post_id)
            .await
    }

    async fn upsert_analytics(
        &self,
        analytics: &PostAnalytics,
    ) -> Result<PostAnalytics, StoreError> {
        self.inner.upsert_analytics(analytics).await
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn insert_generated(&self, content: &GeneratedContent) -> Result<String, StoreError> {
        self.inner.insert_generated(content).await
    }

    async fn list_generated_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<GeneratedContent>, StoreError> {
        self.inner.list_generated_for_user(user_id).await
    }
}

#[async_trait]
impl AutoReplyStore for FlakyStore {
    async fn insert_auto_reply(&self, config: &AutoReplyConfig) -> Result<String, StoreError> {
        self.inner.insert_auto_reply(config).await
    }

    async fn list_auto_replies_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<AutoReplyConfig>, StoreError> {
        self.inner.list_auto_replies_for_user(user_id).await
    }
}

#[async_trait]
impl UserStore for FlakyStore {
    async fn insert_user(&self, user: &User) -> Result<String, StoreError> {
        self.inner.insert_user(user).await
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user(id).await
    }

    async fn find_user_by_identity(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_identity(provider, provider_user_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_email(email).await
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.update_user(user).await
    }
}

#[async_trait]
impl TokenStore for FlakyStore {
    async fn put_token(
        &self,
        user_id: &str,
        provider: Provider,
        token: &StoredToken,
    ) -> Result<(), StoreError> {
        self.inner.put_token(user_id, provider, token).await
    }

    async fn get_token(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<StoredToken>, StoreError> {
        self.inner.get_token(user_id, provider).await
    }
}

// Pending post for `user_id` scheduled at `scheduled_at`
pub fn post(
    user_id: &str,
    platforms: Vec<Platform>,
    media_urls: Vec<&str>,
    scheduled_at: DateTime<Utc>,
) -> ScheduledPost {
    ScheduledPost::new(
        user_id,
        platforms,
        Some("launch day".to_string()),
        media_urls.into_iter().map(String::from).collect(),
        scheduled_at,
    )
}

/// Wall clock that advances with tokio's (possibly paused) clock.
pub fn paused_clock() -> WallClock {
    let origin = Utc::now();
    let start = tokio::time::Instant::now();
    Arc::new(move || {
        origin + chrono::Duration::from_std(start.elapsed()).unwrap_or(chrono::Duration::zero())
    })
}
