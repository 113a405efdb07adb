//! Deferred publishing pipeline for Herald.
//!
//! This crate provides:
//! - An in-process [`Scheduler`] that runs tasks no earlier than their
//!   target time, deduplicates by task key and retries infrastructure failures
//! - The [`JobRunner`], which publishes one scheduled post to every target
//!   platform and records a per-platform outcome
//! - The [`AnalyticsFetcher`] and its read path, [`AnalyticsService`]
//! - [`PostService`] for admitting posts and [`reconcile`] for re-submitting
//!   pending posts after a restart

mod analytics;
mod error;
mod handler;
mod posts;
mod reconcile;
mod runner;
mod scheduler;
mod task;

#[cfg(test)]
mod testing;

pub use analytics::{AnalyticsFetcher, AnalyticsLookup, AnalyticsService, FetchOutcome};
pub use error::{InfrastructureError, PlatformError, SchedulerError, ServiceError, TaskError};
pub use handler::{DEFAULT_EXHAUSTION_POLICY, ExhaustionPolicy, PipelineHandler, TaskHandler};
pub use posts::{MAX_PAGE_SIZE, PostService, ScheduleRequest};
pub use reconcile::{ReconcileReport, reconcile, run_reconciler};
pub use runner::{
    DEFAULT_MISSING_ID_POLICY, JobRunner, MISSING_POST_ID_ERROR, MissingIdPolicy, RunOutcome,
    RunSummary, RunnerConfig,
};
pub use scheduler::{
    DEFAULT_WORKERS, Scheduler, SchedulerConfig, SchedulerStats, TaskQueue, WallClock,
};
pub use task::{RetryPolicy, SubmissionHandle, Task};
