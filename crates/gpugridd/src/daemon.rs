//! Long-running daemon mode.
//!
//! Opens the store, rebuilds the queue, and runs the health monitor, the
//! autoscale driver and a stats logger until the shutdown future resolves.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gpugrid_autoscale::{ScaleCallback, ScaleDecision, ScaleFuture};
use gpugrid_core::GridConfig;
use gpugrid_health::{AutoscaleDriver, HealthMonitor};
use gpugrid_scheduler::Scheduler;
use gpugrid_state::{MemoryStore, RedbStore, Store};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const DB_FILE: &str = "gpugrid.redb";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: GridConfig,
    /// Keep state in `<data_dir>/gpugrid.redb`; in memory when unset.
    pub data_dir: Option<PathBuf>,
    pub sweep_interval: Duration,
    pub autoscale_interval: Duration,
    pub stats_interval: Duration,
}

/// Open the redb store under `data_dir`, or an in-memory store.
pub fn open_store(data_dir: Option<&Path>) -> anyhow::Result<Arc<dyn Store>> {
    match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(DB_FILE);
            let store = RedbStore::open(&path)?;
            info!(path = ?path, "state store opened");
            Ok(Arc::new(store))
        }
        None => {
            info!("using in-memory state store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Scale callback that records decisions in the log.
///
/// Acting on them is the node-pool manager's job; it tails these events.
pub fn logging_scale_fn() -> ScaleCallback {
    Box::new(|decision: ScaleDecision| -> ScaleFuture {
        Box::pin(async move {
            info!(
                target: "gpugridd::scale",
                action = ?decision.action,
                pending_jobs = decision.pending_jobs,
                total_workers = decision.total_workers,
                preemptible = decision.preemptible,
                reason = %decision.reason,
                "scale decision"
            );
            Ok(())
        })
    })
}

/// Build a scheduler over the configured store and recover its queue.
pub async fn build_scheduler(
    config: GridConfig,
    data_dir: Option<&Path>,
) -> anyhow::Result<Arc<Scheduler>> {
    let store = open_store(data_dir)?;
    let scheduler = Scheduler::new(store, config).with_scale_fn(logging_scale_fn());
    let queued = scheduler.recover().await?;
    info!(queued, "scheduler initialized");
    Ok(Arc::new(scheduler))
}

/// Run until `shutdown` resolves, then stop every loop and wait for it.
pub async fn run(opts: RunOptions, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    info!("gpugrid daemon starting");

    let scheduler = build_scheduler(opts.config, opts.data_dir.as_deref()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = HealthMonitor::new(scheduler.clone(), opts.sweep_interval);
    let health_shutdown = shutdown_rx.clone();
    let health_handle = tokio::spawn(async move {
        monitor.run(health_shutdown).await;
    });

    let driver = AutoscaleDriver::new(scheduler.clone(), opts.autoscale_interval);
    let autoscale_shutdown = shutdown_rx.clone();
    let autoscale_handle = tokio::spawn(async move {
        driver.run(autoscale_shutdown).await;
    });

    let stats_scheduler = scheduler.clone();
    let stats_interval = opts.stats_interval;
    let stats_handle = tokio::spawn(async move {
        stats_loop(stats_scheduler, stats_interval, shutdown_rx).await;
    });

    shutdown.await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    join_tasks(vec![
        ("health monitor", health_handle),
        ("autoscale driver", autoscale_handle),
        ("stats reporter", stats_handle),
    ])
    .await;

    info!("gpugrid daemon stopped");
    Ok(())
}

/// Wait for every background task. Returns how many panicked or were
/// cancelled.
pub async fn join_tasks(tasks: Vec<(&'static str, JoinHandle<()>)>) -> usize {
    let mut failed = 0;
    for (task, handle) in tasks {
        if let Err(e) = handle.await {
            error!(task, error = %e, "background task did not shut down cleanly");
            failed += 1;
        }
    }
    failed
}

async fn stats_loop(
    scheduler: Arc<Scheduler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => log_stats(&scheduler).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("stats loop shutting down");
                    break;
                }
            }
        }
    }
}

async fn log_stats(scheduler: &Scheduler) {
    let queue = match scheduler.queue_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "failed to read queue stats");
            return;
        }
    };
    let resources = match scheduler.resource_metrics().await {
        Ok(metrics) => metrics,
        Err(e) => {
            error!(error = %e, "failed to read resource metrics");
            return;
        }
    };

    info!(
        pending = queue.pending_jobs,
        processing = queue.processing_jobs,
        completed = queue.completed_jobs,
        failed = queue.failed_jobs,
        throughput_per_minute = queue.throughput_per_minute,
        idle_workers = resources.idle_workers,
        busy_workers = resources.busy_workers,
        offline_workers = resources.offline_workers,
        cost_per_hour = resources.estimated_cost_per_hour,
        "scheduler stats"
    );
    debug!(
        "metrics\n{}",
        gpugrid_metrics::render_prometheus(&queue, &resources)
    );
}
