//! Task types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_store::Platform;

/// Deferred work the scheduler can run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Task {
    /// Publish a scheduled post to all of its platforms.
    PublishPost { post_id: String },
    /// Fetch and store analytics for one published post.
    FetchAnalytics {
        user_id: String,
        platform: Platform,
        platform_post_id: String,
    },
}

impl Task {
    pub fn publish(post_id: impl Into<String>) -> Self {
        Task::PublishPost {
            post_id: post_id.into(),
        }
    }

    pub fn fetch_analytics(
        user_id: impl Into<String>,
        platform: Platform,
        platform_post_id: impl Into<String>,
    ) -> Self {
        Task::FetchAnalytics {
            user_id: user_id.into(),
            platform,
            platform_post_id: platform_post_id.into(),
        }
    }

    /// Identity used to deduplicate submissions.
    pub fn key(&self) -> String {
        match self {
            Task::PublishPost { post_id } => format!("publish:{}", post_id),
            Task::FetchAnalytics {
                user_id,
                platform,
                platform_post_id,
            } => format!("analytics:{}:{}:{}", user_id, platform, platform_post_id),
        }
    }

    /// Short task kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Task::PublishPost { .. } => "publish",
            Task::FetchAnalytics { .. } => "analytics",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Bounded retry count with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Publishing: 3 retries, 60 seconds apart.
    pub const PUBLISH: RetryPolicy = RetryPolicy {
        max_retries: 3,
        delay: Duration::from_secs(60),
    };

    /// Analytics fetching: 2 retries, 5 minutes apart.
    pub const ANALYTICS: RetryPolicy = RetryPolicy {
        max_retries: 2,
        delay: Duration::from_secs(300),
    };

    /// Whether a task that has failed `failures` times may run again.
    pub fn allows_retry(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Receipt for a submitted task.
///
/// Submitting a task whose key is already tracked returns the handle of the
/// tracked task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionHandle {
    pub key: String,
    /// When the task becomes eligible to run.
    pub run_at: DateTime<Utc>,
}
