//! Document records and stores for Herald.
//!
//! This crate defines the documents Herald persists and the stores that hold them:
//!
//! - **Records**: scheduled posts, analytics, generated content, auto-reply
//!   configurations, user accounts and per-provider tokens
//! - **Store traits**: one trait per collection, each a small find/insert/update surface
//! - **MemoryStore**: concurrent in-memory maps for tests and ephemeral runs
//! - **FileStore**: one JSON file per document, atomic single-document writes

mod error;
mod file;
mod memory;
mod store;
mod types;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{
    AnalyticsStore, AutoReplyStore, ContentStore, JobStore, Store, TokenStore, UserStore,
};
pub use types::*;
