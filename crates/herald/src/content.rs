//! AI content generation.
//!
//! A [`TextGenerator`] turns a prompt into text. [`OpenAiGenerator`] talks to
//! any OpenAI-compatible chat-completions endpoint; [`ContentService`] renders
//! the post prompt, calls the generator and stores the result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use herald_store::{ContentPrompt, GeneratedContent, Platform, Store, StoreError, new_id};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_GENERATOR_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_GENERATOR_MODEL: &str = "gpt-3.5-turbo";

/// Approximate post length in words when none is requested.
pub const DEFAULT_CONTENT_LENGTH: u32 = 50;

const CONTENT_PROMPT_TEMPLATE: &str = "\
Generate a social media post for {platform} based on the following requirements:
Keywords: {keywords}
Tone: {tone}
Approximate Length: {length} words
Additional Notes: {notes}

Post Content:
";

/// Errors from text generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generator API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("generator rate limited")]
    RateLimited,

    #[error("generator returned no text")]
    Empty,

    #[error("no text generator configured")]
    Unavailable,

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Produces text from a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model name recorded alongside generated text.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for an OpenAI-compatible chat-completions API.
pub struct OpenAiGenerator {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(skip(self, prompt), fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(chars = text.len(), "generation complete");
        Ok(text)
    }
}

/// What the user asks the generator for.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRequest {
    pub platform: Platform,
    pub keywords: Vec<String>,
    pub tone: String,
    pub length: Option<u32>,
    pub notes: Option<String>,
}

impl ContentRequest {
    fn into_prompt(self) -> ContentPrompt {
        ContentPrompt {
            platform: self.platform,
            keywords: self.keywords,
            tone: self.tone,
            length: self.length.unwrap_or(DEFAULT_CONTENT_LENGTH),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        }
    }
}

/// Fill the post template from a structured prompt.
pub fn render_prompt(prompt: &ContentPrompt) -> String {
    CONTENT_PROMPT_TEMPLATE
        .replace("{platform}", prompt.platform.as_str())
        .replace("{keywords}", &prompt.keywords.join(", "))
        .replace("{tone}", &prompt.tone)
        .replace("{length}", &prompt.length.to_string())
        .replace("{notes}", prompt.notes.as_deref().unwrap_or("N/A"))
}

/// Generates post content and keeps a history per user.
pub struct ContentService {
    store: Arc<dyn Store>,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl ContentService {
    pub fn new(store: Arc<dyn Store>, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { store, generator }
    }

    /// Generate, store and return post content for `user_id`.
    #[tracing::instrument(skip(self, request), fields(platform = %request.platform))]
    pub async fn generate(
        &self,
        user_id: &str,
        request: ContentRequest,
    ) -> Result<GeneratedContent, GenerationError> {
        let generator = self.generator.as_ref().ok_or(GenerationError::Unavailable)?;
        if request.tone.trim().is_empty() {
            return Err(GenerationError::Invalid("tone is required".to_string()));
        }

        let prompt = request.into_prompt();
        let text = generator.generate(&render_prompt(&prompt)).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }

        let content = GeneratedContent {
            id: new_id(),
            user_id: user_id.to_string(),
            prompt,
            model_used: generator.model().to_string(),
            generated_text: text.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_generated(&content).await?;

        info!(content_id = %content.id, model = %content.model_used, "content generated");
        Ok(content)
    }

    /// Previously generated content for `user_id`.
    pub async fn history(&self, user_id: &str) -> Result<Vec<GeneratedContent>, GenerationError> {
        Ok(self.store.list_generated_for_user(user_id).await?)
    }
}
