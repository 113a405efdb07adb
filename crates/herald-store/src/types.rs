//! Core document types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Collection holding scheduled posts.
pub const POST_COLLECTION: &str = "scheduled_posts";
/// Collection holding fetched post analytics.
pub const ANALYTICS_COLLECTION: &str = "post_analytics";
/// Collection holding generated content.
pub const CONTENT_COLLECTION: &str = "generated_content";
/// Collection holding auto-reply configurations.
pub const AUTO_REPLY_COLLECTION: &str = "auto_reply_configs";
/// Collection holding user accounts.
pub const USER_COLLECTION: &str = "users";
/// Collection holding per-provider tokens, one document per user.
pub const TOKEN_COLLECTION: &str = "tokens";

/// Generate a fresh document id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A social platform posts can be published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    Twitter,
    Linkedin,
}

impl Platform {
    /// Every known platform, in declaration order.
    pub const ALL: [Platform; 4] = [
        Platform::Facebook,
        Platform::Instagram,
        Platform::Twitter,
        Platform::Linkedin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::Linkedin => "linkedin",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown platform or provider tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseTagError {
    kind: &'static str,
    value: String,
}

impl FromStr for Platform {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| ParseTagError {
                kind: "social platform",
                value: s.to_string(),
            })
    }
}

/// An OAuth2 identity provider an account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
    Instagram,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::Facebook, Provider::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
            Provider::Instagram => "instagram",
        }
    }

    /// The provider whose token authorizes publishing to `platform`, if any.
    pub fn for_platform(platform: Platform) -> Option<Provider> {
        match platform {
            Platform::Facebook => Some(Provider::Facebook),
            Platform::Instagram => Some(Provider::Instagram),
            Platform::Twitter | Platform::Linkedin => None,
        }
    }

    /// Whether this provider reports emails trustworthy enough to link accounts by.
    pub fn verifies_email(&self) -> bool {
        matches!(self, Provider::Google | Provider::Facebook)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| ParseTagError {
                kind: "identity provider",
                value: s.to_string(),
            })
    }
}

/// Lifecycle status of a scheduled post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Waiting for its scheduled time.
    #[default]
    Pending,
    /// Published on every platform without a fatal condition.
    Posted,
    /// At least one platform hit a fatal condition.
    Failed,
}

impl PostStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PostStatus::Pending)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PostStatus::Pending => "pending",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        })
    }
}

/// Outcome of publishing a post to one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResult {
    pub success: bool,
    pub post_id: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PostResult {
    pub fn published(post_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            post_id: Some(post_id.into()),
            error: None,
            timestamp,
        }
    }

    pub fn failed(error: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            post_id: None,
            error: Some(error.into()),
            timestamp,
        }
    }
}

/// Per-platform results of one execution, keyed by platform.
pub type PostResults = BTreeMap<Platform, PostResult>;

/// A post scheduled for future publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPost {
    pub id: String,
    pub user_id: String,
    /// Target platforms, in publication order, without duplicates.
    pub platforms: Vec<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub status: PostStatus,
    /// Absent until the post executes; then one entry per platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_results: Option<PostResults>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledPost {
    /// Create a new pending post with a fresh id.
    ///
    /// Duplicate platforms collapse to their first occurrence.
    pub fn new(
        user_id: impl Into<String>,
        platforms: Vec<Platform>,
        text_content: Option<String>,
        media_urls: Vec<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            platforms: dedup_platforms(platforms),
            text_content,
            media_urls,
            scheduled_at,
            status: PostStatus::Pending,
            post_results: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `post_results` holds exactly one entry per target platform.
    pub fn results_complete(&self) -> bool {
        match &self.post_results {
            None => false,
            Some(results) => {
                results.len() == self.platforms.len()
                    && self.platforms.iter().all(|p| results.contains_key(p))
            }
        }
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &PostPatch) {
        self.status = patch.status;
        self.post_results = Some(patch.post_results.clone());
        self.updated_at = patch.updated_at;
    }
}

/// Drop repeated platforms, keeping the first occurrence of each.
pub fn dedup_platforms(platforms: Vec<Platform>) -> Vec<Platform> {
    let mut seen = Vec::with_capacity(platforms.len());
    for platform in platforms {
        if !seen.contains(&platform) {
            seen.push(platform);
        }
    }
    seen
}

/// Whole-document overwrite of a post's execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    pub status: PostStatus,
    pub post_results: PostResults,
    pub updated_at: DateTime<Utc>,
}

/// Raw metrics map as returned by a platform.
pub type Metrics = serde_json::Map<String, serde_json::Value>;

/// Analytics fetched for one published post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAnalytics {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub platform_post_id: String,
    pub metrics: Metrics,
    pub fetched_at: DateTime<Utc>,
}

impl PostAnalytics {
    pub fn new(
        user_id: impl Into<String>,
        platform: Platform,
        platform_post_id: impl Into<String>,
        metrics: Metrics,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            platform,
            platform_post_id: platform_post_id.into(),
            metrics,
            fetched_at: Utc::now(),
        }
    }

    /// Whether these analytics were fetched longer than `max_age` ago.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.fetched_at > max_age
    }
}

/// Structured prompt used to generate post content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPrompt {
    pub platform: Platform,
    pub keywords: Vec<String>,
    pub tone: String,
    /// Approximate length in words.
    pub length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Text produced by the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub id: String,
    pub user_id: String,
    pub prompt: ContentPrompt,
    pub model_used: String,
    pub generated_text: String,
    pub created_at: DateTime<Utc>,
}

/// Condition that triggers an auto-reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutoReplyTrigger {
    /// Any of the keywords appears as a whole word.
    Keyword { keywords: Vec<String> },
    /// Every comment.
    AllComments,
}

/// How an auto-reply is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutoReplyAction {
    /// Fixed template; `{comment}` is replaced with the comment text.
    Template { template: String },
    /// Text generated from a prompt and the comment.
    AiGenerated { prompt: String },
}

/// A user's auto-reply rule for one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoReplyConfig {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub name: String,
    pub is_active: bool,
    pub trigger: AutoReplyTrigger,
    pub action: AutoReplyAction,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A Herald account, possibly linked to several identity providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Provider user id per linked provider.
    #[serde(default)]
    pub identities: BTreeMap<Provider, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Token issued by a provider, stored in the owner's slot for that provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StoredToken {
    /// Whether the token expires before `now + skew`.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at.is_some_and(|at| at <= now + skew)
    }
}

impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn post(platforms: Vec<Platform>) -> ScheduledPost {
        ScheduledPost::new(
            "user-1",
            platforms,
            Some("hello".to_string()),
            vec![],
            Utc::now() + Duration::hours(1),
        )
    }

    #[test_case("facebook", Platform::Facebook)]
    #[test_case("Instagram", Platform::Instagram)]
    #[test_case(" TWITTER ", Platform::Twitter)]
    #[test_case("linkedin", Platform::Linkedin)]
    fn test_platform_parse(input: &str, expected: Platform) {
        assert_eq!(input.parse::<Platform>().unwrap(), expected);
    }

    #[test]
    fn test_platform_parse_unknown() {
        let err = "myspace".parse::<Platform>().unwrap_err();
        assert_eq!(err.to_string(), "unknown social platform: \"myspace\"");
    }

    #[test]
    fn test_provider_for_platform() {
        assert_eq!(Provider::for_platform(Platform::Facebook), Some(Provider::Facebook));
        assert_eq!(Provider::for_platform(Platform::Instagram), Some(Provider::Instagram));
        assert_eq!(Provider::for_platform(Platform::Twitter), None);
        assert!(Provider::Google.verifies_email());
        assert!(!Provider::Instagram.verifies_email());
    }

    #[test]
    fn test_new_post_is_pending_without_results() {
        let post = post(vec![Platform::Facebook]);
        assert_eq!(post.status, PostStatus::Pending);
        assert!(post.post_results.is_none());
        assert!(!post.results_complete());
    }

    #[test]
    fn test_new_post_dedups_platforms() {
        let post = post(vec![
            Platform::Instagram,
            Platform::Facebook,
            Platform::Instagram,
        ]);
        assert_eq!(post.platforms, vec![Platform::Instagram, Platform::Facebook]);
    }

    #[test]
    fn test_results_complete_requires_every_platform() {
        let mut post = post(vec![Platform::Facebook, Platform::Instagram]);
        let now = Utc::now();

        let mut results = PostResults::new();
        results.insert(Platform::Facebook, PostResult::published("p1", now));
        post.post_results = Some(results.clone());
        assert!(!post.results_complete());

        results.insert(Platform::Twitter, PostResult::failed("nope", now));
        post.post_results = Some(results.clone());
        assert!(!post.results_complete());

        results.remove(&Platform::Twitter);
        results.insert(Platform::Instagram, PostResult::failed("nope", now));
        post.post_results = Some(results);
        assert!(post.results_complete());
    }

    #[test]
    fn test_apply_patch_overwrites_outcome() {
        let mut post = post(vec![Platform::Facebook]);
        let now = Utc::now();
        let mut results = PostResults::new();
        results.insert(Platform::Facebook, PostResult::published("p1", now));

        post.apply(&PostPatch {
            status: PostStatus::Posted,
            post_results: results.clone(),
            updated_at: now,
        });

        assert_eq!(post.status, PostStatus::Posted);
        assert_eq!(post.post_results, Some(results));
        assert_eq!(post.updated_at, now);
    }

    #[test]
    fn test_post_serializes_results_keyed_by_platform() {
        let mut post = post(vec![Platform::Facebook]);
        let now = Utc::now();
        let mut results = PostResults::new();
        results.insert(Platform::Facebook, PostResult::published("p1", now));
        post.post_results = Some(results);
        post.status = PostStatus::Posted;

        let value = serde_json::to_value(&post).unwrap();
        assert_eq!(value["status"], "posted");
        assert_eq!(value["platforms"], json!(["facebook"]));
        assert_eq!(value["postResults"]["facebook"]["success"], true);
        assert_eq!(value["postResults"]["facebook"]["postId"], "p1");
        assert!(value["postResults"]["facebook"]["error"].is_null());

        let decoded: ScheduledPost = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, post);
    }

    #[test]
    fn test_auto_reply_trigger_tagged() {
        let trigger = AutoReplyTrigger::Keyword {
            keywords: vec!["price".to_string()],
        };
        let value = serde_json::to_value(&trigger).unwrap();
        assert_eq!(value, json!({"type": "keyword", "keywords": ["price"]}));

        let action: AutoReplyAction =
            serde_json::from_value(json!({"type": "ai_generated", "prompt": "be nice"})).unwrap();
        assert_eq!(
            action,
            AutoReplyAction::AiGenerated {
                prompt: "be nice".to_string()
            }
        );
    }

    #[test]
    fn test_token_expiry_with_skew() {
        let now = Utc::now();
        let mut token = StoredToken {
            access_token: "secret".to_string(),
            refresh_token: None,
            expires_at: None,
            updated_at: now,
        };
        assert!(!token.is_expired(now, Duration::seconds(30)));

        token.expires_at = Some(now + Duration::seconds(10));
        assert!(token.is_expired(now, Duration::seconds(30)));

        token.expires_at = Some(now + Duration::hours(1));
        assert!(!token.is_expired(now, Duration::seconds(30)));
    }

    #[test]
    fn test_token_debug_redacts_secrets() {
        let token = StoredToken {
            access_token: "super-secret".to_string(),
            refresh_token: Some("also-secret".to_string()),
            expires_at: None,
            updated_at: Utc::now(),
        };
        let debug = format!("{:?}", token);
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("also-secret"));
    }

    #[test]
    fn test_analytics_staleness() {
        let mut analytics =
            PostAnalytics::new("user-1", Platform::Facebook, "p1", Metrics::new());
        let now = Utc::now();
        analytics.fetched_at = now - Duration::hours(2);
        assert!(analytics.is_stale(now, Duration::hours(1)));
        assert!(!analytics.is_stale(now, Duration::hours(3)));
    }
}
