//! Rule-based replies to incoming comments.

use std::sync::Arc;

use chrono::Utc;
use herald_auth::{TokenError, TokenProvider};
use herald_platforms::{AdapterError, AdapterRegistry};
use herald_store::{
    AutoReplyAction, AutoReplyConfig, AutoReplyTrigger, Platform, Store, StoreError, new_id,
};
use regex::RegexBuilder;
use thiserror::Error;
use tracing::{debug, info};

use crate::content::{GenerationError, TextGenerator};

/// Placeholder replaced with the comment text in reply templates.
pub const COMMENT_PLACEHOLDER: &str = "{comment}";

#[derive(Debug, Error)]
pub enum AutoReplyError {
    #[error("invalid auto-reply: {0}")]
    Validation(String),

    #[error("no {0} token for this user")]
    TokenMissing(Platform),

    #[error("token resolution failed: {0}")]
    Token(#[from] TokenError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("reply generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// A new auto-reply rule.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAutoReply {
    pub platform: Platform,
    pub name: String,
    pub is_active: bool,
    pub trigger: AutoReplyTrigger,
    pub action: AutoReplyAction,
}

/// A comment received on one of the user's posts.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingComment {
    pub platform: Platform,
    pub comment_id: String,
    pub text: String,
}

/// A reply that was posted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyOutcome {
    /// The rule that produced the reply.
    pub config_id: String,
    pub text: String,
    /// Platform id of the reply, when the platform returned one.
    pub reply_id: Option<String>,
}

/// Whether `trigger` fires for a comment with this text.
///
/// Keywords match case-insensitively as whole words: the text on either
/// side must be a non-word character or the edge of the comment, so
/// keywords like `c++` or `#sale` match too.
pub fn trigger_matches(trigger: &AutoReplyTrigger, text: &str) -> bool {
    match trigger {
        AutoReplyTrigger::AllComments => true,
        AutoReplyTrigger::Keyword { keywords } => keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .any(|keyword| {
                RegexBuilder::new(&format!(r"(?:^|\W){}(?:\W|$)", regex::escape(keyword)))
                    .case_insensitive(true)
                    .build()
                    .is_ok_and(|re| re.is_match(text))
            }),
    }
}

/// Render a reply template for a comment.
pub fn render_template(template: &str, comment: &str) -> String {
    template.replace(COMMENT_PLACEHOLDER, comment)
}

fn validate(config: &NewAutoReply) -> Result<(), AutoReplyError> {
    if config.name.trim().is_empty() {
        return Err(AutoReplyError::Validation("name is required".to_string()));
    }
    if let AutoReplyTrigger::Keyword { keywords } = &config.trigger
        && keywords.iter().all(|k| k.trim().is_empty())
    {
        return Err(AutoReplyError::Validation(
            "keyword trigger needs at least one keyword".to_string(),
        ));
    }
    match &config.action {
        AutoReplyAction::Template { template } if template.trim().is_empty() => Err(
            AutoReplyError::Validation("reply template is empty".to_string()),
        ),
        AutoReplyAction::AiGenerated { prompt } if prompt.trim().is_empty() => Err(
            AutoReplyError::Validation("reply prompt is empty".to_string()),
        ),
        _ => Ok(()),
    }
}

/// Stores auto-reply rules and answers comments with them.
pub struct AutoReplyService {
    store: Arc<dyn Store>,
    tokens: Arc<dyn TokenProvider>,
    adapters: AdapterRegistry,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl AutoReplyService {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: Arc<dyn TokenProvider>,
        adapters: AdapterRegistry,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            store,
            tokens,
            adapters,
            generator,
        }
    }

    /// Store a new rule for `user_id`.
    pub async fn configure(
        &self,
        user_id: &str,
        config: NewAutoReply,
    ) -> Result<AutoReplyConfig, AutoReplyError> {
        validate(&config)?;

        let now = Utc::now();
        let stored = AutoReplyConfig {
            id: new_id(),
            user_id: user_id.to_string(),
            platform: config.platform,
            name: config.name.trim().to_string(),
            is_active: config.is_active,
            trigger: config.trigger,
            action: config.action,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_auto_reply(&stored).await?;

        info!(config_id = %stored.id, user_id, platform = %stored.platform, "auto-reply configured");
        Ok(stored)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<AutoReplyConfig>, AutoReplyError> {
        Ok(self.store.list_auto_replies_for_user(user_id).await?)
    }

    /// Reply to `comment` with the first active matching rule, if any.
    #[tracing::instrument(skip(self, comment), fields(platform = %comment.platform, comment_id = %comment.comment_id))]
    pub async fn process_comment(
        &self,
        user_id: &str,
        comment: &IncomingComment,
    ) -> Result<Option<ReplyOutcome>, AutoReplyError> {
        let configs = self.store.list_auto_replies_for_user(user_id).await?;
        let Some(config) = configs.into_iter().find(|c| {
            c.is_active && c.platform == comment.platform && trigger_matches(&c.trigger, &comment.text)
        }) else {
            debug!("no auto-reply rule matched");
            return Ok(None);
        };

        let text = match &config.action {
            AutoReplyAction::Template { template } => render_template(template, &comment.text),
            AutoReplyAction::AiGenerated { prompt } => {
                let generator = self
                    .generator
                    .as_ref()
                    .ok_or(GenerationError::Unavailable)?;
                let request = format!("{}\n\nComment: {}\n\nReply:", prompt, comment.text);
                generator.generate(&request).await?.trim().to_string()
            }
        };
        if text.is_empty() {
            return Err(GenerationError::Empty.into());
        }

        let token = self
            .tokens
            .resolve(user_id, comment.platform)
            .await?
            .ok_or(AutoReplyError::TokenMissing(comment.platform))?;
        let adapter = self.adapters.require(comment.platform)?;
        let receipt = adapter.reply(&token, &comment.comment_id, &text).await?;

        info!(config_id = %config.id, reply_id = ?receipt.post_id, "auto-reply posted");
        Ok(Some(ReplyOutcome {
            config_id: config.id,
            text,
            reply_id: receipt.post_id,
        }))
    }
}
