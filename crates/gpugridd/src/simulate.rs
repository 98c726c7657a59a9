//! Simulated GPU workers.
//!
//! Registers a pool of workers, submits a mix of jobs, and lets each worker
//! pull, "run" (sleep for a scaled estimate), heartbeat and report until the
//! queue is drained. Useful to watch the scheduler end to end without GPUs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gpugrid_core::{GpuType, GridConfig, JobType, Priority};
use gpugrid_metrics::{CostAnalytics, QueueStats, ResourceMetrics};
use gpugrid_scheduler::{Scheduler, SubmitOptions, WorkerHeartbeat};
use gpugrid_state::{Job, MemoryStore};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::daemon::logging_scale_fn;

const IDLE_POLL: Duration = Duration::from_millis(5);
const USERS: usize = 3;

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub workers: usize,
    pub jobs: usize,
    /// Wall-clock milliseconds slept per estimated job millisecond.
    pub time_scale: f64,
    /// Fail every k-th attempt across the pool.
    pub fail_every: Option<usize>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            jobs: 20,
            time_scale: 0.001,
            fail_every: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub queue: QueueStats,
    pub resources: ResourceMetrics,
    pub costs: CostAnalytics,
    #[serde(skip)]
    pub prometheus: String,
}

fn gpu_for(index: usize) -> GpuType {
    GpuType::ALL[index % GpuType::ALL.len()]
}

fn memory_for(gpu: GpuType) -> u64 {
    match gpu {
        GpuType::T4 => 16_384,
        GpuType::V100 => 32_768,
        GpuType::A100 => 81_920,
    }
}

/// Run the simulation to completion and report the resulting metrics.
pub async fn run_simulation(
    config: GridConfig,
    opts: SimulationOptions,
) -> anyhow::Result<SimulationReport> {
    anyhow::ensure!(opts.workers > 0, "simulation needs at least one worker");
    anyhow::ensure!(
        opts.time_scale.is_finite() && opts.time_scale >= 0.0,
        "time scale must be a non-negative number"
    );

    let scheduler = Arc::new(
        Scheduler::new(Arc::new(MemoryStore::new()), config).with_scale_fn(logging_scale_fn()),
    );

    for i in 0..opts.workers {
        let gpu = gpu_for(i);
        let pool = format!("sim-{}", gpu.as_str().to_ascii_lowercase());
        scheduler
            .register_worker(&format!("sim-worker-{i}"), &pool, gpu, memory_for(gpu))
            .await?;
    }

    for i in 0..opts.jobs {
        let job_type = JobType::ALL[i % JobType::ALL.len()];
        let priority = Priority::ALL[(i / JobType::ALL.len()) % Priority::ALL.len()];
        scheduler
            .submit(
                job_type,
                &format!("sim-user-{}", i % USERS),
                json!({ "index": i }),
                SubmitOptions::with_priority(priority),
            )
            .await?;
    }
    info!(workers = opts.workers, jobs = opts.jobs, "simulation started");

    let attempts = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(opts.workers);
    for i in 0..opts.workers {
        let scheduler = scheduler.clone();
        let attempts = attempts.clone();
        let opts = opts.clone();
        handles.push(tokio::spawn(async move {
            worker_loop(&scheduler, &format!("sim-worker-{i}"), &opts, &attempts).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let queue = scheduler.queue_stats().await?;
    let resources = scheduler.resource_metrics().await?;
    let costs = scheduler.cost_analytics(60 * 60 * 1_000).await?;
    let prometheus = gpugrid_metrics::render_prometheus(&queue, &resources);
    info!(
        completed = queue.completed_jobs,
        failed = queue.failed_jobs,
        total_cost = costs.total_cost,
        "simulation finished"
    );

    Ok(SimulationReport {
        queue,
        resources,
        costs,
        prometheus,
    })
}

async fn worker_loop(
    scheduler: &Scheduler,
    worker_id: &str,
    opts: &SimulationOptions,
    attempts: &AtomicUsize,
) -> anyhow::Result<()> {
    loop {
        let Some(job) = scheduler.assign(worker_id).await? else {
            let stats = scheduler.queue_stats().await?;
            if stats.pending_jobs == 0 && stats.processing_jobs == 0 {
                return Ok(());
            }
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        };

        execute(&job, opts).await;
        scheduler
            .update_heartbeat(
                worker_id,
                WorkerHeartbeat {
                    memory_used_mb: 4_096,
                    utilization_percent: 85.0,
                },
            )
            .await?;

        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match opts.fail_every {
            Some(k) if k > 0 && attempt % k == 0 => {
                scheduler.fail(&job.id, "simulated worker error").await?;
            }
            _ => {
                scheduler
                    .complete(&job.id, json!({ "worker": worker_id }))
                    .await?;
            }
        }
    }
}

async fn execute(job: &Job, opts: &SimulationOptions) {
    let ms = job.estimated_duration_ms as f64 * opts.time_scale;
    debug!(job_id = %job.id, job_type = %job.job_type, sleep_ms = ms, "running job");
    tokio::time::sleep(Duration::from_secs_f64(ms / 1_000.0)).await;
}
