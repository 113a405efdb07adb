//! Graph API HTTP client shared by the Facebook and Instagram adapters.

use std::time::Duration;

use herald_store::{Metrics, Platform};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{AccessToken, AdapterError};

pub const DEFAULT_FACEBOOK_GRAPH_URL: &str = "https://graph.facebook.com/v18.0";
pub const DEFAULT_INSTAGRAM_GRAPH_URL: &str = "https://graph.instagram.com/v18.0";

/// Client for one Graph API host.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
    base_url: String,
    platform: Platform,
}

impl GraphClient {
    /// Create a client for `platform` rooted at `base_url`.
    pub fn new(
        platform: Platform,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(platform, http, base_url))
    }

    /// Create a client reusing an existing connection pool.
    pub fn with_client(platform: Platform, http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            platform,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a Graph node, returning its JSON object.
    pub async fn get(
        &self,
        token: &AccessToken,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Metrics, AdapterError> {
        self.request(Method::GET, token, path, params).await
    }

    /// POST to a Graph edge, returning the created object.
    pub async fn post(
        &self,
        token: &AccessToken,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Metrics, AdapterError> {
        self.request(Method::POST, token, path, params).await
    }

    async fn request(
        &self,
        method: Method,
        token: &AccessToken,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Metrics, AdapterError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(platform = %self.platform, method = method.as_str(), %url, "graph request");

        let response = self
            .http
            .request(method, &url)
            .bearer_auth(token.secret())
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Map error statuses and parse the body as a JSON object.
    async fn handle_response(&self, response: reqwest::Response) -> Result<Metrics, AdapterError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(AdapterError::RateLimited {
                platform: self.platform,
                retry_after_secs,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Metrics::new());
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<GraphErrorBody>(&text) {
                Ok(body) => body.error.message,
                Err(_) => text,
            };
            warn!(platform = %self.platform, status = status.as_u16(), %message, "graph request failed");
            return Err(AdapterError::Api {
                platform: self.platform,
                status: status.as_u16(),
                message,
            });
        }

        match response.json::<serde_json::Value>().await? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(AdapterError::InvalidResponse(format!(
                "expected a JSON object from {}, got {}",
                self.platform, other
            ))),
        }
    }
}

/// Error envelope returned by the Graph API.
#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    message: String,
}

/// Read a string id field from a Graph response.
pub(crate) fn string_field(body: &Metrics, field: &str) -> Option<String> {
    body.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GraphClient {
        GraphClient::new(Platform::Facebook, server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = GraphClient::with_client(
            Platform::Facebook,
            Client::new(),
            "https://graph.example.com/v18.0/",
        );
        assert_eq!(client.base_url(), "https://graph.example.com/v18.0");
    }

    #[tokio::test]
    async fn test_get_sends_bearer_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/123"))
            .and(header("authorization", "Bearer tok"))
            .and(query_param("fields", "likes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "123"})))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server)
            .get(&AccessToken::new("tok"), "123", &[("fields", "likes")])
            .await
            .unwrap();
        assert_eq!(body.get("id"), Some(&json!("123")));
    }

    #[tokio::test]
    async fn test_graph_error_message_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/feed"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Invalid OAuth access token.", "type": "OAuthException", "code": 190}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .post(&AccessToken::new("bad"), "me/feed", &[("message", "hi")])
            .await
            .unwrap_err();
        match err {
            AdapterError::Api {
                platform,
                status,
                message,
            } => {
                assert_eq!(platform, Platform::Facebook);
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid OAuth access token.");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&server)
            .await;

        let err = client(&server)
            .get(&AccessToken::new("tok"), "123", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::RateLimited {
                retry_after_secs: Some(12),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_non_object_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
            .mount(&server)
            .await;

        let err = client(&server)
            .get(&AccessToken::new("tok"), "123", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidResponse(_)));
    }

    #[test]
    fn test_string_field() {
        let mut body = Metrics::new();
        body.insert("id".to_string(), json!("abc"));
        body.insert("empty".to_string(), json!(""));
        body.insert("num".to_string(), json!(5));
        assert_eq!(string_field(&body, "id"), Some("abc".to_string()));
        assert_eq!(string_field(&body, "empty"), None);
        assert_eq!(string_field(&body, "num"), None);
        assert_eq!(string_field(&body, "missing"), None);
    }
}
