//! End-to-end tests of the publishing pipeline over the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{FlakyStore, Reply, ScriptedAdapter, Tokens, paused_clock, post};
use herald_auth::TokenProvider;
use herald_platforms::AdapterRegistry;
use herald_scheduler::{
    AnalyticsFetcher, AnalyticsLookup, AnalyticsService, ExhaustionPolicy, JobRunner,
    PipelineHandler, PostService, RetryPolicy, RunOutcome, RunnerConfig, ScheduleRequest,
    Scheduler, SchedulerConfig, Task, TaskQueue, reconcile,
};
use herald_store::{AnalyticsStore, JobStore, MemoryStore, Platform, PostStatus, Store};
use pretty_assertions::assert_eq;
use tokio::sync::watch;

// Scheduler wired to the real pipeline handler
fn start_scheduler(
    store: Arc<dyn Store>,
    tokens: Arc<dyn TokenProvider>,
    adapters: AdapterRegistry,
    exhaustion: ExhaustionPolicy,
) -> (
    Arc<Scheduler>,
    watch::Sender<bool>,
    tokio::task::JoinHandle<()>,
) {
    let runner = JobRunner::new(
        store.clone(),
        tokens.clone(),
        adapters.clone(),
        RunnerConfig::default(),
    );
    let fetcher = AnalyticsFetcher::new(store.clone(), tokens, adapters, RunnerConfig::default());
    let handler = Arc::new(PipelineHandler::new(runner, fetcher, store, exhaustion));
    let scheduler = Scheduler::with_clock(handler, SchedulerConfig::default(), paused_clock());
    let (tx, rx) = watch::channel(false);
    let join = tokio::spawn(Arc::clone(&scheduler).run(rx));
    (scheduler, tx, join)
}

fn registry(adapters: Vec<Arc<ScriptedAdapter>>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    registry
}

#[tokio::test]
async fn test_single_platform_success() {
    let store = MemoryStore::new();
    let scheduled = post("u1", vec![Platform::Facebook], vec![], Utc::now());
    store.insert_post(&scheduled).await.unwrap();

    let runner = JobRunner::new(
        store.clone(),
        Tokens::linked(&[("u1", Platform::Facebook)]),
        registry(vec![ScriptedAdapter::new(
            Platform::Facebook,
            Reply::Id("p1".to_string()),
        )]),
        RunnerConfig::default(),
    );
    runner.run(&scheduled.id).await.unwrap();

    let stored = store.find_post(&scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Posted);
    let results = stored.post_results.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[&Platform::Facebook].success);
    assert_eq!(results[&Platform::Facebook].post_id.as_deref(), Some("p1"));
}

#[tokio::test]
async fn test_missing_token_fails_only_that_platform() {
    let store = MemoryStore::new();
    let scheduled = post(
        "u1",
        vec![Platform::Facebook, Platform::Instagram],
        vec!["https://cdn.example.com/a.jpg"],
        Utc::now(),
    );
    store.insert_post(&scheduled).await.unwrap();

    let runner = JobRunner::new(
        store.clone(),
        Tokens::linked(&[("u1", Platform::Instagram)]),
        registry(vec![
            ScriptedAdapter::new(Platform::Facebook, Reply::Id("fb1".to_string())),
            ScriptedAdapter::new(Platform::Instagram, Reply::Id("ig1".to_string())),
        ]),
        RunnerConfig::default(),
    );
    runner.run(&scheduled.id).await.unwrap();

    let stored = store.find_post(&scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    let results = stored.post_results.unwrap();
    assert!(!results[&Platform::Facebook].success);
    assert_eq!(
        results[&Platform::Facebook].error.as_deref(),
        Some("authentication token missing or invalid")
    );
    assert!(results[&Platform::Instagram].success);
    assert_eq!(results[&Platform::Instagram].post_id.as_deref(), Some("ig1"));
}

#[tokio::test]
async fn test_instagram_without_media_fails_validation() {
    let store = MemoryStore::new();
    let scheduled = post("u1", vec![Platform::Instagram], vec![], Utc::now());
    store.insert_post(&scheduled).await.unwrap();

    let runner = JobRunner::new(
        store.clone(),
        Tokens::linked(&[("u1", Platform::Instagram)]),
        AdapterRegistry::stub(),
        RunnerConfig::default(),
    );
    runner.run(&scheduled.id).await.unwrap();

    let stored = store.find_post(&scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    let result = &stored.post_results.unwrap()[&Platform::Instagram];
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("media required"));
}

#[tokio::test]
async fn test_rerun_overwrites_with_complete_results() {
    let store = MemoryStore::new();
    let scheduled = post(
        "u1",
        vec![Platform::Facebook, Platform::Instagram],
        vec!["https://cdn.example.com/a.jpg"],
        Utc::now(),
    );
    store.insert_post(&scheduled).await.unwrap();

    let runner = JobRunner::new(
        store.clone(),
        Tokens::linked(&[("u1", Platform::Facebook), ("u1", Platform::Instagram)]),
        AdapterRegistry::stub(),
        RunnerConfig::default(),
    );
    let first = runner.run(&scheduled.id).await.unwrap();
    let second = runner.run(&scheduled.id).await.unwrap();

    let (RunOutcome::Completed(first), RunOutcome::Completed(second)) = (first, second) else {
        panic!("expected both runs to complete");
    };
    assert_eq!(first.status, PostStatus::Posted);
    assert_eq!(second.status, PostStatus::Posted);

    let stored = store.find_post(&scheduled.id).await.unwrap().unwrap();
    assert!(stored.results_complete());
    assert_eq!(stored.post_results.unwrap(), second.results);
}

#[tokio::test(start_paused = true)]
async fn test_analytics_miss_is_pending_then_fetched() {
    let store = MemoryStore::new();
    let (scheduler, tx, join) = start_scheduler(
        store.clone(),
        Tokens::linked(&[("u1", Platform::Facebook)]),
        AdapterRegistry::stub(),
        ExhaustionPolicy::LeavePending,
    );
    let service = AnalyticsService::new(store.clone(), scheduler.clone());

    let lookup = service
        .get_analytics("u1", Platform::Facebook, "p1")
        .await
        .unwrap();
    assert_eq!(lookup, AnalyticsLookup::Pending);

    tokio::time::sleep(Duration::from_secs(1)).await;

    let stored = store
        .find_analytics("u1", Platform::Facebook, "p1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.metrics["likes"]["summary"]["total_count"], 10);

    let lookup = service
        .get_analytics("u1", Platform::Facebook, "p1")
        .await
        .unwrap();
    assert!(matches!(lookup, AnalyticsLookup::Ready(_)));

    tx.send(true).unwrap();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_post_published_at_target_time() {
    let store = MemoryStore::new();
    let (scheduler, tx, join) = start_scheduler(
        store.clone(),
        Tokens::linked(&[("u1", Platform::Facebook)]),
        AdapterRegistry::stub(),
        ExhaustionPolicy::LeavePending,
    );
    let service = PostService::new(store.clone(), scheduler.clone());

    let scheduled = service
        .schedule_post(
            "u1",
            ScheduleRequest {
                platforms: vec![Platform::Facebook],
                text_content: Some("launch day".to_string()),
                media_urls: vec![],
                scheduled_at: Utc::now() + chrono::Duration::seconds(120),
            },
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(119)).await;
    let pending = service.get_post("u1", &scheduled.id).await.unwrap();
    assert_eq!(pending.status, PostStatus::Pending);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let posted = service.get_post("u1", &scheduled.id).await.unwrap();
    assert_eq!(posted.status, PostStatus::Posted);
    let result = &posted.post_results.unwrap()[&Platform::Facebook];
    assert!(result.post_id.as_deref().unwrap().starts_with("mock_fb_post_"));

    tx.send(true).unwrap();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_retried_until_write_succeeds() {
    let store = FlakyStore::failing_updates(2);
    let scheduled = post("u1", vec![Platform::Facebook], vec![], Utc::now());
    store.insert_post(&scheduled).await.unwrap();
    let adapter = ScriptedAdapter::new(Platform::Facebook, Reply::Id("p1".to_string()));

    let (scheduler, tx, join) = start_scheduler(
        store.clone(),
        Tokens::linked(&[("u1", Platform::Facebook)]),
        registry(vec![adapter.clone()]),
        ExhaustionPolicy::LeavePending,
    );
    scheduler
        .submit(Task::publish(&scheduled.id), Utc::now())
        .await
        .unwrap();

    tokio::time::sleep(RetryPolicy::PUBLISH.delay * 3).await;

    let stored = store.find_post(&scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Posted);
    assert_eq!(adapter.publishes(), 3);
    assert_eq!(scheduler.stats().await.retried, 2);

    tx.send(true).unwrap();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_publish_marked_failed() {
    let attempts = RetryPolicy::PUBLISH.max_attempts() as usize;
    let store = FlakyStore::failing_updates(attempts);
    let scheduled = post("u1", vec![Platform::Facebook, Platform::Instagram], vec![], Utc::now());
    store.insert_post(&scheduled).await.unwrap();

    let (scheduler, tx, join) = start_scheduler(
        store.clone(),
        Tokens::linked(&[("u1", Platform::Facebook)]),
        AdapterRegistry::stub(),
        ExhaustionPolicy::MarkFailed,
    );
    scheduler
        .submit(Task::publish(&scheduled.id), Utc::now())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;

    let stored = store.find_post(&scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    assert!(stored.results_complete());
    assert_eq!(scheduler.stats().await.exhausted, 1);

    tx.send(true).unwrap();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_publish_left_pending_is_reconciled() {
    let attempts = RetryPolicy::PUBLISH.max_attempts() as usize;
    let store = FlakyStore::failing_updates(attempts);
    let scheduled = post("u1", vec![Platform::Facebook], vec![], Utc::now());
    store.insert_post(&scheduled).await.unwrap();

    let (scheduler, tx, join) = start_scheduler(
        store.clone(),
        Tokens::linked(&[("u1", Platform::Facebook)]),
        AdapterRegistry::stub(),
        ExhaustionPolicy::LeavePending,
    );
    scheduler
        .submit(Task::publish(&scheduled.id), Utc::now())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;
    let stored = store.find_post(&scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Pending);
    assert!(!scheduler.is_tracked(&Task::publish(&scheduled.id).key()).await);

    let report = reconcile(store.as_ref(), scheduler.as_ref(), Utc::now(), chrono::Duration::zero())
        .await
        .unwrap();
    assert_eq!(report.submitted, 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let stored = store.find_post(&scheduled.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Posted);

    tx.send(true).unwrap();
    join.await.unwrap();
}
