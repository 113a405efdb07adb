//! Store traits, one per collection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    AutoReplyConfig, GeneratedContent, Platform, PostAnalytics, PostPatch, PostStatus, Provider,
    ScheduledPost, StoreError, StoredToken, User,
};

/// Persistent record of scheduled posts and their lifecycle state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new post, returning its id.
    async fn insert_post(&self, post: &ScheduledPost) -> Result<String, StoreError>;

    /// Find a post by id.
    async fn find_post(&self, id: &str) -> Result<Option<ScheduledPost>, StoreError>;

    /// Find a post by id, only if it belongs to `user_id`.
    async fn find_post_for_user(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<ScheduledPost>, StoreError> {
        Ok(self.find_post(id).await?.filter(|p| p.user_id == user_id))
    }

    /// List a user's posts, newest `scheduled_at` first.
    async fn list_posts_for_user(
        &self,
        user_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError>;

    /// Atomically overwrite a post's status, results and `updated_at`.
    async fn update_post(&self, id: &str, patch: &PostPatch) -> Result<(), StoreError>;

    /// Posts in `status` scheduled at or before `before`, oldest first.
    async fn find_due(
        &self,
        status: PostStatus,
        before: DateTime<Utc>,
    ) -> Result<Vec<ScheduledPost>, StoreError>;
}

/// Fetched analytics, unique per `(user, platform, platform post id)`.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn find_analytics(
        &self,
        user_id: &str,
        platform: Platform,
        platform_post_id: &str,
    ) -> Result<Option<PostAnalytics>, StoreError>;

    /// Insert or replace the analytics for the record's key.
    ///
    /// An existing record keeps its id. Returns the stored record.
    async fn upsert_analytics(&self, analytics: &PostAnalytics)
    -> Result<PostAnalytics, StoreError>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert_generated(&self, content: &GeneratedContent) -> Result<String, StoreError>;

    async fn list_generated_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<GeneratedContent>, StoreError>;
}

#[async_trait]
pub trait AutoReplyStore: Send + Sync {
    async fn insert_auto_reply(&self, config: &AutoReplyConfig) -> Result<String, StoreError>;

    async fn list_auto_replies_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<AutoReplyConfig>, StoreError>;
}

/// User accounts and their linked identities.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<String, StoreError>;

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_identity(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Replace an existing user document.
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;
}

/// Per-(user, provider) token slots.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Write the token into the user's slot for `provider`, leaving other slots untouched.
    async fn put_token(
        &self,
        user_id: &str,
        provider: Provider,
        token: &StoredToken,
    ) -> Result<(), StoreError>;

    async fn get_token(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<StoredToken>, StoreError>;
}

/// Every collection Herald uses.
pub trait Store:
    JobStore + AnalyticsStore + ContentStore + AutoReplyStore + UserStore + TokenStore
{
}

impl<T> Store for T where
    T: JobStore + AnalyticsStore + ContentStore + AutoReplyStore + UserStore + TokenStore
{
}

/// Sort newest `scheduled_at` first and apply skip/limit.
pub(crate) fn page_newest_first(
    mut posts: Vec<ScheduledPost>,
    skip: usize,
    limit: usize,
) -> Vec<ScheduledPost> {
    posts.sort_by(|a, b| {
        b.scheduled_at
            .cmp(&a.scheduled_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    posts.into_iter().skip(skip).take(limit).collect()
}

/// Keep posts in `status` due by `before`, oldest first.
pub(crate) fn filter_due(
    posts: impl IntoIterator<Item = ScheduledPost>,
    status: PostStatus,
    before: DateTime<Utc>,
) -> Vec<ScheduledPost> {
    let mut due: Vec<_> = posts
        .into_iter()
        .filter(|p| p.status == status && p.scheduled_at <= before)
        .collect();
    due.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    due
}

/// Emails compare case-insensitively.
pub(crate) fn email_matches(user: &User, email: &str) -> bool {
    user.email
        .as_deref()
        .is_some_and(|e| e.eq_ignore_ascii_case(email))
}
