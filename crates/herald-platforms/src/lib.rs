//! Social platform adapters for Herald.
//!
//! Every platform is reached through the [`PlatformAdapter`] trait:
//! - Publishing text and media, returning the platform's post id
//! - Fetching engagement metrics for a published post
//! - Replying to comments, where the platform allows it
//!
//! Adapters run either in stub mode (deterministic mock responses) or
//! against the Graph API through a shared [`GraphClient`].

mod adapter;
mod error;
mod facebook;
mod graph;
mod instagram;
mod registry;

pub use adapter::{AccessToken, PlatformAdapter, PostContent, PublishReceipt};
pub use error::AdapterError;
pub use facebook::FacebookAdapter;
pub use graph::{DEFAULT_FACEBOOK_GRAPH_URL, DEFAULT_INSTAGRAM_GRAPH_URL, GraphClient};
pub use instagram::InstagramAdapter;
pub use registry::{AdapterMode, AdapterRegistry};
