//! Instagram adapter.
//!
//! Instagram only accepts media posts. Live publishing goes through the
//! content publishing flow: create a media container per item, wrap several
//! items in a carousel container, then publish the container.

use async_trait::async_trait;
use herald_store::{Metrics, Platform};
use serde_json::json;
use tracing::{debug, info};

use crate::adapter::{into_metrics, mock_id};
use crate::graph::string_field;
use crate::{AccessToken, AdapterError, GraphClient, PlatformAdapter, PostContent, PublishReceipt};

const ANALYTICS_FIELDS: &str = "like_count,comments_count";

/// Instagram caps carousels at ten items.
const MAX_CAROUSEL_ITEMS: usize = 10;

#[derive(Debug, Clone)]
pub struct InstagramAdapter {
    client: Option<GraphClient>,
}

impl InstagramAdapter {
    pub fn stub() -> Self {
        Self { client: None }
    }

    pub fn live(client: GraphClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    fn validate(content: &PostContent) -> Result<(), AdapterError> {
        if !content.has_media() {
            return Err(AdapterError::validation("media required"));
        }
        if content.media_urls.len() > MAX_CAROUSEL_ITEMS {
            return Err(AdapterError::validation(format!(
                "at most {} media items allowed",
                MAX_CAROUSEL_ITEMS
            )));
        }
        Ok(())
    }

    async fn create_container(
        client: &GraphClient,
        token: &AccessToken,
        params: &[(&str, &str)],
    ) -> Result<String, AdapterError> {
        let body = client.post(token, "me/media", params).await?;
        string_field(&body, "id").ok_or_else(|| {
            AdapterError::InvalidResponse("media container id missing".to_string())
        })
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(
        &self,
        token: &AccessToken,
        content: &PostContent,
    ) -> Result<PublishReceipt, AdapterError> {
        Self::validate(content)?;

        let Some(client) = &self.client else {
            let post_id = mock_id("mock_ig_post");
            info!(%post_id, "stub instagram publish");
            return Ok(PublishReceipt::with_id(post_id));
        };

        let caption = content.text().unwrap_or_default();
        let container = match content.media_urls.as_slice() {
            [single] => {
                let mut params = vec![("image_url", single.as_str())];
                if !caption.is_empty() {
                    params.push(("caption", caption));
                }
                Self::create_container(client, token, &params).await?
            }
            items => {
                let mut children = Vec::with_capacity(items.len());
                for url in items {
                    let child = Self::create_container(
                        client,
                        token,
                        &[("image_url", url.as_str()), ("is_carousel_item", "true")],
                    )
                    .await?;
                    children.push(child);
                }
                let children = children.join(",");
                let mut params = vec![("media_type", "CAROUSEL"), ("children", children.as_str())];
                if !caption.is_empty() {
                    params.push(("caption", caption));
                }
                Self::create_container(client, token, &params).await?
            }
        };
        debug!(%container, "created instagram media container");

        let body = client
            .post(token, "me/media_publish", &[("creation_id", container.as_str())])
            .await?;
        Ok(PublishReceipt {
            post_id: string_field(&body, "id"),
        })
    }

    async fn fetch_analytics(
        &self,
        token: &AccessToken,
        platform_post_id: &str,
    ) -> Result<Metrics, AdapterError> {
        let Some(client) = &self.client else {
            return Ok(into_metrics(json!({
                "like_count": 25,
                "comments_count": 8,
                "id": platform_post_id,
            })));
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
            return Ok(PublishReceipt::with_id(mock_id("mock_ig_reply")));
        };

        let path = format!("{}/replies", target_id);
        let body = client.post(token, &path, &[("message", text)]).await?;
        Ok(PublishReceipt {
            post_id: string_field(&body, "id"),
        })
    }
}
