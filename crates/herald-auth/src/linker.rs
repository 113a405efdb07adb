//! Linking identity provider profiles to Herald accounts.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use herald_store::{Provider, Store, StoredToken, User, new_id};
use serde_json::Value;
use tracing::{debug, info};

use crate::LinkError;

/// Profile fields Herald keeps from a provider's userinfo response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: Provider,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl ProviderProfile {
    /// Extract the profile from a provider's userinfo JSON.
    ///
    /// Google identifies users by `sub`, Facebook and Instagram by `id`.
    /// Instagram exposes only a username and never an email.
    pub fn from_userinfo(provider: Provider, info: &Value) -> Result<Self, LinkError> {
        let id_field = match provider {
            Provider::Google => "sub",
            Provider::Facebook | Provider::Instagram => "id",
        };
        let provider_user_id = id_string(info.get(id_field)).ok_or(LinkError::MissingId {
            provider,
            field: id_field,
        })?;

        let text = |field: &str| {
            info.get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let (email, name, picture) = match provider {
            Provider::Google => (text("email"), text("name"), text("picture")),
            Provider::Facebook => (
                text("email"),
                text("name"),
                info.pointer("/picture/data/url")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ),
            Provider::Instagram => (None, text("username"), None),
        };

        Ok(Self {
            provider,
            provider_user_id,
            email,
            name,
            picture,
        })
    }
}

/// Ids arrive as strings or, from some endpoints, as numbers.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Token material issued at the end of an OAuth flow.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl IssuedToken {
    /// Parse an OAuth2 token response.
    ///
    /// Expiry comes from `expires_at` (unix seconds) or `expires_in` relative to `now`.
    pub fn from_token_response(
        provider: Provider,
        response: &Value,
        now: DateTime<Utc>,
    ) -> Result<Self, LinkError> {
        let access_token = response
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(LinkError::MissingAccessToken(provider))?
            .to_string();
        let refresh_token = response
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string);

        let expires_at = response
            .get("expires_at")
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                response
                    .get("expires_in")
                    .and_then(Value::as_i64)
                    .map(|secs| now + Duration::seconds(secs))
            });

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    fn into_stored(self, now: DateTime<Utc>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            updated_at: now,
        }
    }
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Creates or updates accounts from provider logins.
pub struct AccountLinker {
    store: Arc<dyn Store>,
}

impl AccountLinker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Link a provider login to an account.
    ///
    /// Looks the user up by provider identity, then (for providers with
    /// verified emails) by email. An existing account gains the identity and
    /// any profile fields it lacks; otherwise a new account is created. The
    /// issued token is written only to that account's slot for `provider`.
    #[tracing::instrument(skip(self, userinfo, token))]
    pub async fn link(
        &self,
        provider: Provider,
        userinfo: &Value,
        token: Option<IssuedToken>,
    ) -> Result<User, LinkError> {
        let profile = ProviderProfile::from_userinfo(provider, userinfo)?;
        let now = Utc::now();

        let mut existing = self
            .store
            .find_user_by_identity(provider, &profile.provider_user_id)
            .await?;

        if existing.is_none() && provider.verifies_email() {
            if let Some(email) = &profile.email {
                existing = self.store.find_user_by_email(email).await?;
                if let Some(user) = &existing {
                    info!(user_id = %user.id, %provider, "linking provider to account by email");
                }
            }
        }

        let user = match existing {
            Some(mut user) => {
                user.identities
                    .insert(provider, profile.provider_user_id.clone());
                if user.full_name.is_none() {
                    user.full_name = profile.name;
                }
                if user.picture.is_none() {
                    user.picture = profile.picture;
                }
                user.updated_at = now;
                self.store.update_user(&user).await?;
                debug!(user_id = %user.id, "updated account");
                user
            }
            None => {
                let user = User {
                    id: new_id(),
                    email: profile.email,
                    full_name: profile.name,
                    picture: profile.picture,
                    identities: [(provider, profile.provider_user_id)].into(),
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_user(&user).await?;
                info!(user_id = %user.id, %provider, "created account");
                user
            }
        };

        if let Some(token) = token {
            self.store
                .put_token(&user.id, provider, &token.into_stored(now))
                .await?;
        }

        Ok(user)
    }
}
