//! Facebook adapter.

use async_trait::async_trait;
use herald_store::{Metrics, Platform};
use serde_json::json;
use tracing::{info, warn};

use crate::adapter::{into_metrics, mock_id};
use crate::graph::string_field;
use crate::{AccessToken, AdapterError, GraphClient, PlatformAdapter, PostContent, PublishReceipt};

const ANALYTICS_FIELDS: &str = "likes.summary(true),comments.summary(true),shares";

/// Publishes to the user's feed through the Facebook Graph API.
#[derive(Debug, Clone)]
pub struct FacebookAdapter {
    client: Option<GraphClient>,
}

impl FacebookAdapter {
    /// Adapter returning mock ids and metrics without network access.
    pub fn stub() -> Self {
        Self { client: None }
    }

    /// Adapter calling the Graph API.
    pub fn live(client: GraphClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    fn validate(content: &PostContent) -> Result<(), AdapterError> {
        if content.text().is_none() && !content.has_media() {
            return Err(AdapterError::validation("text or media required"));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(
        &self,
        token: &AccessToken,
        content: &PostContent,
    ) -> Result<PublishReceipt, AdapterError> {
        Self::validate(content)?;

        let Some(client) = &self.client else {
            let post_id = mock_id("mock_fb_post");
            info!(%post_id, "stub facebook publish");
            return Ok(PublishReceipt::with_id(post_id));
        };

        let message = content.text().unwrap_or_default();
        let body = match content.media_urls.first() {
            Some(url) => {
                if content.media_urls.len() > 1 {
                    warn!(
                        count = content.media_urls.len(),
                        "facebook photo posts carry one image, extra media dropped"
                    );
                }
                let mut params = vec![("url", url.as_str())];
                if !message.is_empty() {
                    params.push(("caption", message));
                }
                client.post(token, "me/photos", &params).await?
            }
            None => client.post(token, "me/feed", &[("message", message)]).await?,
        };

        // Photo uploads report the feed story as `post_id` and the photo as `id`.
        let post_id = string_field(&body, "post_id").or_else(|| string_field(&body, "id"));
        Ok(PublishReceipt { post_id })
    }

    async fn fetch_analytics(
        &self,
        token: &AccessToken,
        platform_post_id: &str,
    ) -> Result<Metrics, AdapterError> {
        let Some(client) = &self.client else {
            let mock = json!({
                "likes": {"summary": {"total_count": 10}},
                "comments": {"summary": {"total_count": 5}},
                "shares": {"count": 2},
                "id": platform_post_id,
            });
            return Ok(into_metrics(mock));
        };

        client
            .get(token, platform_post_id, &[("fields", ANALYTICS_FIELDS)])
            .await
    }

    async fn reply(
        &self,
        token: &AccessToken,
        target_id: &str,
        text: &str,
    ) -> Result<PublishReceipt, AdapterError> {
        let Some(client) = &self.client else {
            return Ok(PublishReceipt::with_id(mock_id("mock_fb_reply")));
        };

        let path = format!("{}/comments", target_id);
        let body = client.post(token, &path, &[("message", text)]).await?;
        Ok(PublishReceipt {
            post_id: string_field(&body, "id"),
        })
    }
}
