//! Long-running publisher: scheduler plus periodic reconciliation.

use std::sync::Arc;

use herald_scheduler::run_reconciler;
use miette::Result;
use tokio::sync::watch;
use tracing::info;

use crate::app::App;

/// Run until ctrl-c.
pub async fn run(app: App) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    run_until(app, shutdown_rx).await
}

/// Run until `shutdown_rx` turns true or its sender is dropped.
pub async fn run_until(app: App, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    info!(
        store = ?app.settings.store,
        adapter_mode = %app.settings.adapter_mode,
        workers = app.settings.workers,
        "starting daemon"
    );

    let scheduler = app.scheduler();

    // Start the scheduler
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx.clone()));

    // Start the reconciler
    let reconciler_handle = {
        let store = Arc::clone(&app.store);
        let queue = Arc::clone(&scheduler);
        let interval = app.settings.reconcile_interval();
        let lookahead = app.settings.reconcile_lookahead();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            run_reconciler(store.as_ref(), queue.as_ref(), interval, lookahead, shutdown_rx).await;
        })
    };

    // Wait for shutdown signal
    let mut main_shutdown_rx = shutdown_rx;
    loop {
        if main_shutdown_rx.changed().await.is_err() || *main_shutdown_rx.borrow() {
            break;
        }
    }

    info!("shutting down daemon tasks");

    let _ = reconciler_handle.await;
    let _ = scheduler_handle.await;

    let stats = scheduler.stats().await;
    info!(
        submitted = stats.submitted,
        succeeded = stats.succeeded,
        retried = stats.retried,
        exhausted = stats.exhausted,
        abandoned = stats.queued,
        "daemon shut down gracefully"
    );
    Ok(())
}
