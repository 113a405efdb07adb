//! Credentials for Herald.
//!
//! - [`StoredTokenProvider`] resolves the access token to publish with for
//!   a `(user, platform)` pair from per-provider token slots
//! - [`AccountLinker`] maps an identity provider profile onto a single
//!   Herald account, linking by verified email where possible

mod error;
mod linker;
mod provider;

pub use error::{LinkError, TokenError};
pub use linker::{AccountLinker, IssuedToken, ProviderProfile};
pub use provider::{DEFAULT_EXPIRY_SKEW_SECS, StoredTokenProvider, TokenProvider};
