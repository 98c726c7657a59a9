//! Autoscale driver: polls the scheduler's autoscaler on a fixed interval.
//!
//! Submissions already trigger a check; the timer catches the scale-down
//! case, which only becomes true as idle time accumulates.

use std::sync::Arc;
use std::time::Duration;

use gpugrid_autoscale::ScaleDecision;
use gpugrid_scheduler::{Scheduler, SchedulerResult};
use tokio::sync::watch;
use tracing::{debug, error, info};

pub struct AutoscaleDriver {
    scheduler: Arc<Scheduler>,
    interval: Duration,
}

impl AutoscaleDriver {
    pub fn new(scheduler: Arc<Scheduler>, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
        }
    }

    /// Run one check. Decisions reach the scheduler's scale callback.
    pub async fn tick(&self) -> SchedulerResult<ScaleDecision> {
        let decision = self.scheduler.check_auto_scaling().await?;
        if decision.is_action() {
            info!(
                action = ?decision.action,
                pending = decision.pending_jobs,
                workers = decision.total_workers,
                reason = %decision.reason,
                "autoscale decision"
            );
        } else {
            debug!(reason = %decision.reason, "autoscale: no change");
        }
        Ok(decision)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "autoscale check failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("autoscale driver shutting down");
                        break;
                    }
                }
            }
        }
    }
}
