//! Health monitor: background sweeps for lost workers and overrunning jobs.

use std::sync::Arc;
use std::time::Duration;

use gpugrid_core::JobId;
use gpugrid_scheduler::{Scheduler, SchedulerResult};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Workers newly marked offline.
    pub offline_workers: usize,
    /// Jobs failed for exceeding the job timeout.
    pub timed_out_jobs: Vec<JobId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.offline_workers == 0 && self.timed_out_jobs.is_empty()
    }
}

/// Periodically reclaims work from silent workers and times out stuck jobs.
pub struct HealthMonitor {
    scheduler: Arc<Scheduler>,
    interval: Duration,
    stale_threshold_ms: u64,
}

impl HealthMonitor {
    /// Sweep every `interval`, treating a worker as stale after three missed
    /// heartbeat intervals.
    pub fn new(scheduler: Arc<Scheduler>, interval: Duration) -> Self {
        let stale_threshold_ms = scheduler.config().scheduler.stale_threshold_ms();
        Self {
            scheduler,
            interval,
            stale_threshold_ms,
        }
    }

    /// Override the staleness threshold.
    pub fn with_stale_threshold(mut self, threshold_ms: u64) -> Self {
        self.stale_threshold_ms = threshold_ms;
        self
    }

    pub fn stale_threshold_ms(&self) -> u64 {
        self.stale_threshold_ms
    }

    /// Run both sweeps once.
    pub async fn sweep_once(&self) -> SchedulerResult<SweepReport> {
        let offline_workers = self
            .scheduler
            .sweep_offline_workers(self.stale_threshold_ms)
            .await?;
        let timed_out_jobs = self.scheduler.sweep_timed_out_jobs().await?;

        let report = SweepReport {
            offline_workers,
            timed_out_jobs,
        };
        if report.is_empty() {
            debug!("health sweep: nothing to do");
        } else {
            info!(
                offline_workers = report.offline_workers,
                timed_out_jobs = report.timed_out_jobs.len(),
                "health sweep"
            );
        }
        Ok(report)
    }

    /// Sweep on every tick until `shutdown` flips to true.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            stale_threshold_ms = self.stale_threshold_ms,
            "health monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "health sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }
}
