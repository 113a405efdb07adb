//! Error types for the publishing pipeline.

use std::time::Duration;

use herald_auth::TokenError;
use herald_platforms::AdapterError;
use herald_store::StoreError;
use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler has shut down and no longer admits tasks.
    #[error("scheduler is shut down")]
    ShutDown,

    /// Store error while loading work.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of the store underneath a pipeline run. The whole run is retried.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("store {operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Why publishing to (or fetching from) one platform failed.
///
/// Recorded in the post's per-platform result. Never retried.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// No usable token for the platform.
    #[error("authentication token missing or invalid")]
    TokenMissing,

    /// Token lookup failed.
    #[error("token resolution failed: {0}")]
    Token(#[from] TokenError),

    /// The adapter refused or failed the call.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// A token or adapter call exceeded its time bound.
    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Outcome of one task attempt that did not succeed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Transient failure; the task is retried up to its bound.
    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] InfrastructureError),

    /// Failure that retrying will not fix.
    #[error("{0}")]
    Permanent(String),
}

impl TaskError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Infrastructure(_))
    }
}

/// Errors surfaced to callers of the ingress services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request rejected before anything was written.
    #[error("validation error: {0}")]
    Validation(String),

    /// Nothing found for this owner.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}
