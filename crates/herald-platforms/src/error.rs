//! Error types for platform adapters.

use herald_store::Platform;
use thiserror::Error;

/// Errors that can occur when talking to a social platform.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Content is missing something the platform requires.
    #[error("{0}")]
    Validation(String),

    /// No adapter is registered for the platform.
    #[error("posting to {0} is not implemented")]
    Unsupported(Platform),

    /// The platform does not support replying to comments.
    #[error("replying on {0} is not supported")]
    ReplyUnsupported(Platform),

    /// The platform rejected the request.
    #[error("{platform} API error ({status}): {message}")]
    Api {
        platform: Platform,
        status: u16,
        message: String,
    },

    /// Rate limited by the platform.
    #[error("rate limited by {platform}{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        platform: Platform,
        retry_after_secs: Option<u64>,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AdapterError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
