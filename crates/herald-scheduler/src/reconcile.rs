//! Recovery of PENDING posts the scheduler lost track of.
//!
//! The in-process queue does not survive a restart, and a submit can fail
//! after the post was stored. Reconciliation scans the store for PENDING posts
//! due soon and submits any that are not already tracked.

use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_store::{JobStore, PostStatus};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{SchedulerError, Task, TaskQueue};

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// PENDING posts due within the lookahead.
    pub found: usize,
    /// Posts submitted by this pass.
    pub submitted: usize,
    /// Posts already tracked by the queue.
    pub skipped: usize,
}

/// Submit every untracked PENDING post scheduled before `now + lookahead`.
///
/// Overdue posts are submitted to run immediately.
pub async fn reconcile<S: JobStore + ?Sized>(
    store: &S,
    queue: &dyn TaskQueue,
    now: DateTime<Utc>,
    lookahead: chrono::Duration,
) -> Result<ReconcileReport, SchedulerError> {
    let due = store.find_due(PostStatus::Pending, now + lookahead).await?;
    let mut report = ReconcileReport {
        found: due.len(),
        ..ReconcileReport::default()
    };

    for post in due {
        let task = Task::publish(&post.id);
        if queue.is_tracked(&task.key()).await {
            report.skipped += 1;
            continue;
        }
        queue.submit(task, post.scheduled_at.max(now)).await?;
        report.submitted += 1;
    }

    if report.submitted > 0 {
        info!(
            found = report.found,
            submitted = report.submitted,
            skipped = report.skipped,
            "reconciled pending posts"
        );
    } else {
        debug!(found = report.found, "nothing to reconcile");
    }
    Ok(report)
}

/// Reconcile every `interval` until shutdown.
///
/// The first pass runs immediately.
pub async fn run_reconciler<S: JobStore + ?Sized>(
    store: &S,
    queue: &dyn TaskQueue,
    interval: Duration,
    lookahead: chrono::Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "reconciler starting");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("reconciler shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                match reconcile(store, queue, Utc::now(), lookahead).await {
                    Ok(_) => {}
                    Err(SchedulerError::ShutDown) => {
                        warn!("scheduler stopped accepting tasks, reconciler exiting");
                        break;
                    }
                    Err(e) => error!(error = %e, "reconciliation failed"),
                }
            }
        }
    }
}
