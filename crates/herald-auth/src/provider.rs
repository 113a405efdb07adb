//! Token resolution for publishing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use herald_platforms::AccessToken;
use herald_store::{Platform, Provider, Store, TokenStore};
use tracing::{debug, warn};

use crate::TokenError;

/// Tokens expiring within this many seconds are treated as expired.
pub const DEFAULT_EXPIRY_SKEW_SECS: i64 = 30;

/// Supplies the access token to act on a user's behalf on a platform.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A usable token, or `None` if the user has none for this platform.
    async fn resolve(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<AccessToken>, TokenError>;
}

/// Reads tokens from the owner's per-provider slots.
pub struct StoredTokenProvider<S: ?Sized = dyn Store> {
    tokens: Arc<S>,
    skew: Duration,
}

impl<S: TokenStore + ?Sized> StoredTokenProvider<S> {
    pub fn new(tokens: Arc<S>) -> Self {
        Self {
            tokens,
            skew: Duration::seconds(DEFAULT_EXPIRY_SKEW_SECS),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }
}

#[async_trait]
impl<S: TokenStore + ?Sized> TokenProvider for StoredTokenProvider<S> {
    async fn resolve(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<AccessToken>, TokenError> {
        let Some(provider) = Provider::for_platform(platform) else {
            debug!(user_id, %platform, "no identity provider issues tokens for platform");
            return Ok(None);
        };

        let Some(stored) = self.tokens.get_token(user_id, provider).await? else {
            return Ok(None);
        };

        if stored.access_token.is_empty() {
            return Ok(None);
        }

        if stored.is_expired(Utc::now(), self.skew) {
            warn!(user_id, %platform, expires_at = ?stored.expires_at, "stored token expired");
            return Ok(None);
        }

        Ok(Some(AccessToken::new(stored.access_token)))
    }
}
