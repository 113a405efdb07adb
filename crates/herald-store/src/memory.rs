//! In-memory document store.
//!
//! Thread-safe maps with no persistence. Used by tests and ephemeral runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::store::{email_matches, filter_due, page_newest_first};
use crate::{
    ANALYTICS_COLLECTION, AUTO_REPLY_COLLECTION, AnalyticsStore, AutoReplyConfig, AutoReplyStore,
    CONTENT_COLLECTION, ContentStore, GeneratedContent, JobStore, POST_COLLECTION, Platform,
    PostAnalytics, PostPatch, PostStatus, Provider, ScheduledPost, StoreError, StoredToken,
    TokenStore, USER_COLLECTION, User, UserStore,
};

type AnalyticsKey = (String, Platform, String);

/// In-memory store backed by concurrent maps.
#[derive(Default)]
pub struct MemoryStore {
    posts: DashMap<String, ScheduledPost>,
    analytics: DashMap<AnalyticsKey, PostAnalytics>,
    content: DashMap<String, GeneratedContent>,
    auto_replies: DashMap<String, AutoReplyConfig>,
    users: DashMap<String, User>,
    tokens: DashMap<String, BTreeMap<Provider, StoredToken>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn analytics_count(&self) -> usize {
        self.analytics.len()
    }
}

fn insert_unique<T: Clone>(
    map: &DashMap<String, T>,
    collection: &str,
    id: &str,
    doc: &T,
) -> Result<String, StoreError> {
    match map.entry(id.to_string()) {
        Entry::Occupied(_) => Err(StoreError::conflict(collection, id)),
        Entry::Vacant(slot) => {
            slot.insert(doc.clone());
            Ok(id.to_string())
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_post(&self, post: &ScheduledPost) -> Result<String, StoreError> {
        insert_unique(&self.posts, POST_COLLECTION, &post.id, post)
    }

    async fn find_post(&self, id: &str) -> Result<Option<ScheduledPost>, StoreError> {
        Ok(self.posts.get(id).map(|p| p.value().clone()))
    }

    async fn list_posts_for_user(
        &self,
        user_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let posts = self
            .posts
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.value().clone())
            .collect();
        Ok(page_newest_first(posts, skip, limit))
    }

    async fn update_post(&self, id: &str, patch: &PostPatch) -> Result<(), StoreError> {
        let mut post = self
            .posts
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(POST_COLLECTION, id))?;
        post.apply(patch);
        Ok(())
    }

    async fn find_due(
        &self,
        status: PostStatus,
        before: DateTime<Utc>,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let posts: Vec<_> = self.posts.iter().map(|p| p.value().clone()).collect();
        Ok(filter_due(posts, status, before))
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn find_analytics(
        &self,
        user_id: &str,
        platform: Platform,
        platform_post_id: &str,
    ) -> Result<Option<PostAnalytics>, StoreError> {
        let key = (user_id.to_string(), platform, platform_post_id.to_string());
        Ok(self.analytics.get(&key).map(|a| a.value().clone()))
    }

    async fn upsert_analytics(
        &self,
        analytics: &PostAnalytics,
    ) -> Result<PostAnalytics, StoreError> {
        let key = (
            analytics.user_id.clone(),
            analytics.platform,
            analytics.platform_post_id.clone(),
        );
        let stored = match self.analytics.entry(key) {
            Entry::Occupied(mut existing) => {
                let mut record = analytics.clone();
                record.id = existing.get().id.clone();
                existing.insert(record.clone());
                record
            }
            Entry::Vacant(slot) => {
                slot.insert(analytics.clone());
                analytics.clone()
            }
        };
        tracing::trace!(collection = ANALYTICS_COLLECTION, id = %stored.id, "upserted analytics");
        Ok(stored)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_generated(&self, content: &GeneratedContent) -> Result<String, StoreError> {
        insert_unique(&self.content, CONTENT_COLLECTION, &content.id, content)
    }

    async fn list_generated_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<GeneratedContent>, StoreError> {
        let mut items: Vec<_> = self
            .content
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.value().clone())
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }
}

#[async_trait]
impl AutoReplyStore for MemoryStore {
    async fn insert_auto_reply(&self, config: &AutoReplyConfig) -> Result<String, StoreError> {
        insert_unique(&self.auto_replies, AUTO_REPLY_COLLECTION, &config.id, config)
    }

    async fn list_auto_replies_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<AutoReplyConfig>, StoreError> {
        let mut items: Vec<_> = self
            .auto_replies
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.value().clone())
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<String, StoreError> {
        insert_unique(&self.users, USER_COLLECTION, &user.id, user)
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn find_user_by_identity(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.identities.get(&provider).map(String::as_str) == Some(provider_user_id))
            .map(|u| u.value().clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| email_matches(u.value(), email))
            .map(|u| u.value().clone()))
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut existing = self
            .users
            .get_mut(&user.id)
            .ok_or_else(|| StoreError::not_found(USER_COLLECTION, &user.id))?;
        *existing = user.clone();
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn put_token(
        &self,
        user_id: &str,
        provider: Provider,
        token: &StoredToken,
    ) -> Result<(), StoreError> {
        self.tokens
            .entry(user_id.to_string())
            .or_default()
            .insert(provider, token.clone());
        Ok(())
    }

    async fn get_token(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<StoredToken>, StoreError> {
        Ok(self
            .tokens
            .get(user_id)
            .and_then(|slots| slots.get(&provider).cloned()))
    }
}
