//! The adapter capability every platform implements.

use std::fmt;

use async_trait::async_trait;
use herald_store::{Metrics, Platform, ScheduledPost};

use crate::AdapterError;

/// Bearer credential for a platform API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Content handed to an adapter for publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostContent {
    pub text: Option<String>,
    pub media_urls: Vec<String>,
}

impl PostContent {
    /// Text with surrounding whitespace removed, if any remains.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn has_media(&self) -> bool {
        !self.media_urls.is_empty()
    }
}

impl From<&ScheduledPost> for PostContent {
    fn from(post: &ScheduledPost) -> Self {
        Self {
            text: post.text_content.clone(),
            media_urls: post.media_urls.clone(),
        }
    }
}

/// What a platform returned after accepting a post.
///
/// A platform may accept a post without reporting its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub post_id: Option<String>,
}

impl PublishReceipt {
    pub fn with_id(post_id: impl Into<String>) -> Self {
        Self {
            post_id: Some(post_id.into()),
        }
    }

    pub fn without_id() -> Self {
        Self { post_id: None }
    }
}

/// Uniform access to one social platform.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// The platform this adapter talks to.
    fn platform(&self) -> Platform;

    /// Publish content on behalf of the token's owner.
    async fn publish(
        &self,
        token: &AccessToken,
        content: &PostContent,
    ) -> Result<PublishReceipt, AdapterError>;

    /// Fetch raw engagement metrics for a published post.
    async fn fetch_analytics(
        &self,
        token: &AccessToken,
        platform_post_id: &str,
    ) -> Result<Metrics, AdapterError>;

    /// Reply to a comment.
    async fn reply(
        &self,
        _token: &AccessToken,
        _target_id: &str,
        _text: &str,
    ) -> Result<PublishReceipt, AdapterError> {
        Err(AdapterError::ReplyUnsupported(self.platform()))
    }
}

/// Mock id in the `<prefix>_<unix seconds with fraction>` form.
pub(crate) fn mock_id(prefix: &str) -> String {
    let now = chrono::Utc::now();
    format!(
        "{}_{}.{:06}",
        prefix,
        now.timestamp(),
        now.timestamp_subsec_micros()
    )
}

/// Object fields of a JSON value; non-objects yield an empty map.
pub(crate) fn into_metrics(value: serde_json::Value) -> Metrics {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Metrics::new(),
    }
}
