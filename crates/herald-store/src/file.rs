//! File-backed document store.
//!
//! Each document lives in `<root>/<collection>/<id>.json`. Writes go to a
//! temporary sibling file which is then renamed over the target, so readers
//! only ever observe whole documents. Read-modify-write sequences are
//! serialized within the process by a single mutex.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::store::{email_matches, filter_due, page_newest_first};
use crate::{
    ANALYTICS_COLLECTION, AUTO_REPLY_COLLECTION, AnalyticsStore, AutoReplyConfig, AutoReplyStore,
    CONTENT_COLLECTION, ContentStore, GeneratedContent, JobStore, POST_COLLECTION, Platform,
    PostAnalytics, PostPatch, PostStatus, Provider, ScheduledPost, StoreError, StoredToken,
    TOKEN_COLLECTION, TokenStore, USER_COLLECTION, User, UserStore,
};

const COLLECTIONS: [&str; 6] = [
    POST_COLLECTION,
    ANALYTICS_COLLECTION,
    CONTENT_COLLECTION,
    AUTO_REPLY_COLLECTION,
    USER_COLLECTION,
    TOKEN_COLLECTION,
];

/// Maximum accepted length of a document id.
const MAX_ID_LEN: usize = 128;

/// Store keeping one JSON file per document.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for collection in COLLECTIONS {
            fs::create_dir_all(root.join(collection)).await?;
        }
        debug!(root = %root.display(), "opened file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.root.join(collection).join(format!("{}.json", id)))
    }

    async fn read_doc<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let path = self.doc_path(collection, id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_doc<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        let path = self.doc_path(collection, id)?;
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec_pretty(doc)?;

        fs::write(&tmp, &bytes).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn insert_doc<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> Result<String, StoreError> {
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(self.doc_path(collection, id)?).await? {
            return Err(StoreError::conflict(collection, id));
        }
        self.write_doc(collection, id, doc).await?;
        Ok(id.to_string())
    }

    /// Read every parseable document in a collection.
    ///
    /// Documents that fail to parse are logged and skipped.
    async fn scan<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, StoreError> {
        let mut entries = fs::read_dir(self.root.join(collection)).await?;
        let mut docs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                // Renamed or removed between listing and reading.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice(&bytes) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable document"),
            }
        }

        Ok(docs)
    }
}

fn validate_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn insert_post(&self, post: &ScheduledPost) -> Result<String, StoreError> {
        self.insert_doc(POST_COLLECTION, &post.id, post).await
    }

    async fn find_post(&self, id: &str) -> Result<Option<ScheduledPost>, StoreError> {
        self.read_doc(POST_COLLECTION, id).await
    }

    async fn list_posts_for_user(
        &self,
        user_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let posts: Vec<ScheduledPost> = self.scan(POST_COLLECTION).await?;
        let owned = posts.into_iter().filter(|p| p.user_id == user_id).collect();
        Ok(page_newest_first(owned, skip, limit))
    }

    async fn update_post(&self, id: &str, patch: &PostPatch) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut post: ScheduledPost = self
            .read_doc(POST_COLLECTION, id)
            .await?
            .ok_or_else(|| StoreError::not_found(POST_COLLECTION, id))?;
        post.apply(patch);
        self.write_doc(POST_COLLECTION, id, &post).await
    }

    async fn find_due(
        &self,
        status: PostStatus,
        before: DateTime<Utc>,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let posts: Vec<ScheduledPost> = self.scan(POST_COLLECTION).await?;
        Ok(filter_due(posts, status, before))
    }
}

#[async_trait]
impl AnalyticsStore for FileStore {
    async fn find_analytics(
        &self,
        user_id: &str,
        platform: Platform,
        platform_post_id: &str,
    ) -> Result<Option<PostAnalytics>, StoreError> {
        let all: Vec<PostAnalytics> = self.scan(ANALYTICS_COLLECTION).await?;
        Ok(all.into_iter().find(|a| {
            a.user_id == user_id && a.platform == platform && a.platform_post_id == platform_post_id
        }))
    }

    async fn upsert_analytics(
        &self,
        analytics: &PostAnalytics,
    ) -> Result<PostAnalytics, StoreError> {
        let _guard = self.write_lock.lock().await;
        let existing = self
            .find_analytics(
                &analytics.user_id,
                analytics.platform,
                &analytics.platform_post_id,
            )
            .await?;

        let mut record = analytics.clone();
        if let Some(existing) = existing {
            record.id = existing.id;
        }
        self.write_doc(ANALYTICS_COLLECTION, &record.id, &record)
            .await?;
        Ok(record)
    }
}

#[async_trait]
impl ContentStore for FileStore {
    async fn insert_generated(&self, content: &GeneratedContent) -> Result<String, StoreError> {
        self.insert_doc(CONTENT_COLLECTION, &content.id, content)
            .await
    }

    async fn list_generated_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<GeneratedContent>, StoreError> {
        let all: Vec<GeneratedContent> = self.scan(CONTENT_COLLECTION).await?;
        let mut items: Vec<_> = all.into_iter().filter(|c| c.user_id == user_id).collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }
}

#[async_trait]
impl AutoReplyStore for FileStore {
    async fn insert_auto_reply(&self, config: &AutoReplyConfig) -> Result<String, StoreError> {
        self.insert_doc(AUTO_REPLY_COLLECTION, &config.id, config)
            .await
    }

    async fn list_auto_replies_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<AutoReplyConfig>, StoreError> {
        let all: Vec<AutoReplyConfig> = self.scan(AUTO_REPLY_COLLECTION).await?;
        let mut items: Vec<_> = all.into_iter().filter(|c| c.user_id == user_id).collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }
}

#[async_trait]
impl UserStore for FileStore {
    async fn insert_user(&self, user: &User) -> Result<String, StoreError> {
        self.insert_doc(USER_COLLECTION, &user.id, user).await
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.read_doc(USER_COLLECTION, id).await
    }

    async fn find_user_by_identity(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let users: Vec<User> = self.scan(USER_COLLECTION).await?;
        Ok(users.into_iter().find(|u| {
            u.identities.get(&provider).map(String::as_str) == Some(provider_user_id)
        }))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users: Vec<User> = self.scan(USER_COLLECTION).await?;
        Ok(users.into_iter().find(|u| email_matches(u, email)))
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if !fs::try_exists(self.doc_path(USER_COLLECTION, &user.id)?).await? {
            return Err(StoreError::not_found(USER_COLLECTION, &user.id));
        }
        self.write_doc(USER_COLLECTION, &user.id, user).await
    }
}

#[async_trait]
impl TokenStore for FileStore {
    async fn put_token(
        &self,
        user_id: &str,
        provider: Provider,
        token: &StoredToken,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut slots: BTreeMap<Provider, StoredToken> = self
            .read_doc(TOKEN_COLLECTION, user_id)
            .await?
            .unwrap_or_default();
        slots.insert(provider, token.clone());
        self.write_doc(TOKEN_COLLECTION, user_id, &slots).await
    }

    async fn get_token(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<StoredToken>, StoreError> {
        let slots: Option<BTreeMap<Provider, StoredToken>> =
            self.read_doc(TOKEN_COLLECTION, user_id).await?;
        Ok(slots.and_then(|mut s| s.remove(&provider)))
    }
}
