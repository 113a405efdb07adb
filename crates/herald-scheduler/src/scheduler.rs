//! In-process task scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, OwnedSemaphorePermit, RwLock, Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::{RetryPolicy, SchedulerError, SubmissionHandle, Task, TaskError, TaskHandler};

/// Maximum sleep duration between scheduler checks.
const MAX_SLEEP_SECS: u64 = 60;

/// Default number of tasks allowed to run at once.
pub const DEFAULT_WORKERS: usize = 4;

/// Source of wall-clock time for comparing against task targets.
pub type WallClock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A queue of deferred tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue `task` to run no earlier than `run_at`.
    ///
    /// Returns without waiting for the task. A task whose key is already
    /// queued or running is not queued again; its existing handle is returned.
    async fn submit(
        &self,
        task: Task,
        run_at: DateTime<Utc>,
    ) -> Result<SubmissionHandle, SchedulerError>;

    /// Whether a task with this key is queued or running.
    async fn is_tracked(&self, key: &str) -> bool;
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum tasks running at once.
    pub workers: usize,
    pub publish_retry: RetryPolicy,
    pub analytics_retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            publish_retry: RetryPolicy::PUBLISH,
            analytics_retry: RetryPolicy::ANALYTICS,
        }
    }
}

impl SchedulerConfig {
    fn retry_policy(&self, task: &Task) -> RetryPolicy {
        match task {
            Task::PublishPost { .. } => self.publish_retry,
            Task::FetchAnalytics { .. } => self.analytics_retry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Waiting,
    Running,
}

#[derive(Debug, Clone)]
struct QueuedTask {
    task: Task,
    key: String,
    run_at: DateTime<Utc>,
    /// Monotonic instant at which the task becomes due.
    deadline: Instant,
    failures: u32,
    state: TaskState,
}

impl QueuedTask {
    fn handle(&self) -> SubmissionHandle {
        SubmissionHandle {
            key: self.key.clone(),
            run_at: self.run_at,
        }
    }

    /// Whether the task may start now.
    ///
    /// A passed deadline is not enough: if the wall clock was stepped back
    /// and `run_at` is still ahead, the deadline is moved out to match.
    fn is_due(&mut self, now: Instant, wall: DateTime<Utc>) -> bool {
        if self.state != TaskState::Waiting || self.deadline > now {
            return false;
        }
        match (self.run_at - wall).to_std() {
            Ok(remaining) if !remaining.is_zero() => {
                self.deadline = now + remaining;
                false
            }
            _ => true,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    deduplicated: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    exhausted: AtomicU64,
}

/// Snapshot of scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub deduplicated: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub exhausted: u64,
    /// Tasks waiting for their deadline or a worker.
    pub queued: usize,
    pub running: usize,
}

/// The task scheduler.
pub struct Scheduler {
    handler: Arc<dyn TaskHandler>,
    config: SchedulerConfig,
    tasks: RwLock<Vec<QueuedTask>>,
    wake: Notify,
    workers: Arc<Semaphore>,
    accepting: AtomicBool,
    counters: Counters,
    clock: WallClock,
}

impl Scheduler {
    /// Create a new scheduler dispatching to `handler`.
    pub fn new(handler: Arc<dyn TaskHandler>, config: SchedulerConfig) -> Arc<Self> {
        Self::with_clock(handler, config, Arc::new(Utc::now))
    }

    /// Create a scheduler that reads wall-clock time from `clock`.
    pub fn with_clock(
        handler: Arc<dyn TaskHandler>,
        config: SchedulerConfig,
        clock: WallClock,
    ) -> Arc<Self> {
        let config = SchedulerConfig {
            workers: config.workers.max(1),
            ..config
        };
        Arc::new(Self {
            handler,
            workers: Arc::new(Semaphore::new(config.workers)),
            config,
            tasks: RwLock::new(Vec::new()),
            wake: Notify::new(),
            accepting: AtomicBool::new(true),
            counters: Counters::default(),
            clock,
        })
    }

    /// Current counters and queue sizes.
    pub async fn stats(&self) -> SchedulerStats {
        let tasks = self.tasks.read().await;
        let running = tasks
            .iter()
            .filter(|t| t.state == TaskState::Running)
            .count();
        SchedulerStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            deduplicated: self.counters.deduplicated.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            exhausted: self.counters.exhausted.load(Ordering::Relaxed),
            queued: tasks.len() - running,
            running,
        }
    }

    /// Run the scheduler loop until shutdown, then wait for in-flight tasks.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(workers = self.config.workers, "scheduler starting");
        let mut in_flight = JoinSet::new();

        loop {
            // Check for shutdown
            if *shutdown_rx.borrow() {
                info!("scheduler shutting down");
                break;
            }

            self.dispatch_due(&mut in_flight).await;

            let wake_at = self.next_wake().await;

            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        info!("shutdown channel closed, scheduler stopping");
                        break;
                    }
                }
                _ = self.wake.notified() => {}
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "scheduler worker failed");
                    }
                }
                _ = sleep_until(wake_at) => {}
            }
        }

        self.accepting.store(false, Ordering::SeqCst);

        if !in_flight.is_empty() {
            info!(count = in_flight.len(), "waiting for in-flight tasks");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "scheduler worker failed");
            }
        }

        info!("scheduler shut down gracefully");
    }

    /// Start every due task a worker is free for.
    async fn dispatch_due(self: &Arc<Self>, in_flight: &mut JoinSet<()>) {
        loop {
            let Ok(permit) = Arc::clone(&self.workers).try_acquire_owned() else {
                debug!("all workers busy");
                return;
            };

            let Some((task, attempt)) = self.take_due_task().await else {
                return;
            };

            let scheduler = Arc::clone(self);
            in_flight.spawn(async move {
                scheduler.execute(task, attempt, permit).await;
            });
        }
    }

    /// Take the earliest due task and mark it running.
    async fn take_due_task(&self) -> Option<(Task, u32)> {
        let now = Instant::now();
        let wall = (self.clock)();
        let mut tasks = self.tasks.write().await;
        let next = tasks
            .iter_mut()
            .filter_map(|t| if t.is_due(now, wall) { Some(t) } else { None })
            .min_by_key(|t| t.deadline)?;
        next.state = TaskState::Running;
        Some((next.task.clone(), next.failures + 1))
    }

    /// When the loop should next look for due tasks.
    async fn next_wake(&self) -> Instant {
        let cap = Instant::now() + Duration::from_secs(MAX_SLEEP_SECS);

        // A finishing worker wakes the loop; no point polling for due work.
        if self.workers.available_permits() == 0 {
            return cap;
        }

        self.tasks
            .read()
            .await
            .iter()
            .filter(|t| t.state == TaskState::Waiting)
            .map(|t| t.deadline)
            .min()
            .map_or(cap, |deadline| deadline.min(cap))
    }

    /// Execute a single task attempt and record its outcome.
    #[tracing::instrument(skip(self, task, permit), fields(task = %task, kind = task.kind()))]
    async fn execute(self: Arc<Self>, task: Task, attempt: u32, permit: OwnedSemaphorePermit) {
        debug!(attempt, "running task");

        // A panicking handler must not leave the task marked running forever.
        let handler = Arc::clone(&self.handler);
        let attempt_task = task.clone();
        let result = match tokio::spawn(async move { handler.handle(&attempt_task).await }).await {
            Ok(result) => result,
            Err(e) => Err(TaskError::Permanent(format!("task handler failed: {}", e))),
        };

        self.complete(&task, result).await;

        drop(permit);
        self.wake.notify_one();
    }

    /// Apply the outcome of an attempt: forget, requeue for retry, or exhaust.
    async fn complete(&self, task: &Task, result: Result<(), TaskError>) {
        let key = task.key();
        let policy = self.config.retry_policy(task);

        let mut tasks = self.tasks.write().await;
        let Some(index) = tasks.iter().position(|t| t.key == key) else {
            warn!(task = %key, "completed task no longer tracked");
            return;
        };

        let error = match result {
            Ok(()) => {
                tasks.remove(index);
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!(task = %key, "task succeeded");
                return;
            }
            Err(error) => error,
        };

        let entry = &mut tasks[index];
        entry.failures += 1;

        if error.is_retryable() && policy.allows_retry(entry.failures) {
            entry.state = TaskState::Waiting;
            entry.deadline = Instant::now() + policy.delay;
            entry.run_at = (self.clock)()
                + chrono::Duration::from_std(policy.delay).unwrap_or(chrono::Duration::zero());
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            warn!(
                task = %key,
                failures = entry.failures,
                max_retries = policy.max_retries,
                retry_in_secs = policy.delay.as_secs(),
                error = %error,
                "task failed, scheduled retry"
            );
            return;
        }

        let failures = entry.failures;
        tasks.remove(index);
        drop(tasks);

        self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
        error!(task = %key, attempts = failures, error = %error, "task permanently failed");
        self.handler.on_exhausted(task, &error).await;
    }
}

#[async_trait]
impl TaskQueue for Scheduler {
    #[tracing::instrument(skip(self, task, run_at), fields(task = %task, run_at = %run_at))]
    async fn submit(
        &self,
        task: Task,
        run_at: DateTime<Utc>,
    ) -> Result<SubmissionHandle, SchedulerError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShutDown);
        }

        let key = task.key();
        let mut tasks = self.tasks.write().await;

        // Check for duplicates
        if let Some(existing) = tasks.iter().find(|t| t.key == key) {
            self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
            debug!(task = %key, "task already tracked");
            return Ok(existing.handle());
        }

        let delay = (run_at - (self.clock)()).to_std().unwrap_or(Duration::ZERO);
        let queued = QueuedTask {
            task,
            key,
            run_at,
            deadline: Instant::now() + delay,
            failures: 0,
            state: TaskState::Waiting,
        };
        let handle = queued.handle();
        tasks.push(queued);
        drop(tasks);

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(delay_secs = delay.as_secs(), "task queued");
        self.wake.notify_one();
        Ok(handle)
    }

    async fn is_tracked(&self, key: &str) -> bool {
        self.tasks.read().await.iter().any(|t| t.key == key)
    }
}
