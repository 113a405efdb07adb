//! Error types for credential handling.

use herald_store::{Provider, StoreError};
use thiserror::Error;

/// Errors resolving a token for publication.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Token store failed.
    #[error("token store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors linking a provider identity to an account.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Profile did not carry the provider's user id.
    #[error("{provider} profile is missing its user id ({field})")]
    MissingId {
        provider: Provider,
        field: &'static str,
    },

    /// Token response did not carry an access token.
    #[error("{0} token response is missing access_token")]
    MissingAccessToken(Provider),

    /// Store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
