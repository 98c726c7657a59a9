//! Autoscaler: cooldown-gated scale decisions over a pool snapshot.

use gpugrid_core::{AutoscalingSettings, WorkerId};
use gpugrid_state::Worker;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What the pool should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    None,
}

/// A scaling recommendation and the numbers behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleDecision {
    pub action: ScaleAction,
    pub reason: String,
    pub pending_jobs: usize,
    pub total_workers: u32,
    /// Whether new capacity may be preemptible.
    pub preemptible: bool,
}

impl ScaleDecision {
    pub fn is_action(&self) -> bool {
        self.action != ScaleAction::None
    }
}

/// Callback that hands a scale-up/scale-down decision to whatever manages
/// the node pool.
pub type ScaleCallback = Box<dyn Fn(ScaleDecision) -> ScaleFuture + Send + Sync>;

/// Future returned by a [`ScaleCallback`].
pub type ScaleFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
>;

/// Pool state the autoscaler decides on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub pending_jobs: usize,
    /// Workers not marked offline.
    pub total_workers: u32,
    /// Idle workers with the age of their last heartbeat.
    pub idle_workers: Vec<(WorkerId, u64)>,
}

impl PoolSnapshot {
    pub fn from_workers(pending_jobs: usize, workers: &[Worker], now: u64) -> Self {
        let total_workers = workers.iter().filter(|w| w.is_online()).count() as u32;
        let idle_workers = workers
            .iter()
            .filter(|w| w.is_idle())
            .map(|w| (w.worker_id.clone(), now.saturating_sub(w.last_heartbeat)))
            .collect();
        Self {
            pending_jobs,
            total_workers,
            idle_workers,
        }
    }
}

/// Cooldown-gated scaling decision procedure.
pub struct Autoscaler {
    config: AutoscalingSettings,
    /// Time of the last ScaleUp/ScaleDown, if any.
    last_scale_action: Option<u64>,
}

impl Autoscaler {
    pub fn new(config: AutoscalingSettings) -> Self {
        Self {
            config,
            last_scale_action: None,
        }
    }

    pub fn last_scale_action(&self) -> Option<u64> {
        self.last_scale_action
    }

    /// Evaluate the pool and return a decision.
    pub fn evaluate(&mut self, snapshot: &PoolSnapshot, now: u64) -> ScaleDecision {
        let preemptible = self.config.preemptible_enabled;
        let decide = |action: ScaleAction, reason: String| ScaleDecision {
            action,
            reason,
            pending_jobs: snapshot.pending_jobs,
            total_workers: snapshot.total_workers,
            preemptible,
        };

        if let Some(last) = self.last_scale_action
            && now.saturating_sub(last) < self.config.cooldown_period_ms
        {
            debug!(
                since_last_ms = now.saturating_sub(last),
                cooldown_ms = self.config.cooldown_period_ms,
                "autoscale check inside cooldown"
            );
            return decide(ScaleAction::None, "cooldown".to_string());
        }

        let pending = snapshot.pending_jobs;
        let workers = snapshot.total_workers;

        if pending >= self.config.scale_up_threshold as usize && workers < self.config.max_workers {
            let decision = decide(
                ScaleAction::ScaleUp,
                format!(
                    "pending queue {pending} >= threshold {} with {workers}/{} workers",
                    self.config.scale_up_threshold, self.config.max_workers
                ),
            );
            self.last_scale_action = Some(now);
            info!(pending, workers, reason = %decision.reason, "scale up recommended");
            return decision;
        }

        if pending == 0 && workers > self.config.min_workers {
            let idle = snapshot
                .idle_workers
                .iter()
                .find(|(_, age)| *age > self.config.scale_down_threshold_ms);
            if let Some((worker_id, age)) = idle {
                let decision = decide(
                    ScaleAction::ScaleDown,
                    format!(
                        "worker {worker_id} idle for {age}ms (threshold {}ms), queue empty",
                        self.config.scale_down_threshold_ms
                    ),
                );
                self.last_scale_action = Some(now);
                info!(workers, reason = %decision.reason, "scale down recommended");
                return decision;
            }
        }

        decide(ScaleAction::None, "no scaling needed".to_string())
    }
}
