//! Queue, resource, wait-time and cost figures computed from records.

use std::collections::BTreeMap;

use gpugrid_core::{CostRates, GpuType, JobType, Priority};
use gpugrid_state::{Job, JobStatus, Worker, WorkerStatus};
use serde::{Deserialize, Serialize};

/// Mean processing time assumed before any job has completed.
pub const DEFAULT_PROCESSING_TIME_MS: f64 = 5_000.0;

const THROUGHPUT_WINDOW_MS: u64 = 60_000;
const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Current priority-queue length.
    pub pending_jobs: usize,
    pub processing_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
    /// Mean `started_at - created_at` over completed jobs.
    pub average_wait_time_ms: f64,
    /// Mean `actual_duration_ms` over completed jobs.
    pub average_processing_time_ms: f64,
    /// Jobs completed in the last 60 seconds.
    pub throughput_per_minute: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub total_workers: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub draining_workers: usize,
    pub offline_workers: usize,
    pub total_memory_mb: u64,
    pub used_memory_mb: u64,
    pub average_utilization_percent: f64,
    /// Sum of hourly rates over workers that are not offline.
    pub estimated_cost_per_hour: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostAnalytics {
    pub period_ms: u64,
    pub jobs_completed: usize,
    pub total_processing_ms: u64,
    pub total_cost: f64,
    pub cost_by_gpu_type: BTreeMap<GpuType, f64>,
    pub cost_by_job_type: BTreeMap<JobType, f64>,
    /// Processing time as a share of available worker time in the window.
    pub efficiency_percent: f64,
}

fn mean(values: impl Iterator<Item = u64>) -> Option<f64> {
    let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum as f64 / count as f64)
}

fn completed(jobs: &[Job]) -> impl Iterator<Item = &Job> {
    jobs.iter().filter(|j| j.status == JobStatus::Completed)
}

/// Mean `actual_duration_ms` over completed jobs, if any completed.
pub fn average_processing_time_ms(jobs: &[Job]) -> Option<f64> {
    mean(completed(jobs).filter_map(|j| j.actual_duration_ms))
}

pub fn queue_stats(jobs: &[Job], pending_jobs: usize, now: u64) -> QueueStats {
    let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
    let window_start = now.saturating_sub(THROUGHPUT_WINDOW_MS);

    QueueStats {
        pending_jobs,
        processing_jobs: count(JobStatus::Processing),
        completed_jobs: count(JobStatus::Completed),
        failed_jobs: count(JobStatus::Failed),
        cancelled_jobs: count(JobStatus::Cancelled),
        average_wait_time_ms: mean(completed(jobs).filter_map(Job::wait_time_ms)).unwrap_or(0.0),
        average_processing_time_ms: average_processing_time_ms(jobs).unwrap_or(0.0),
        throughput_per_minute: completed(jobs)
            .filter(|j| j.completed_at.is_some_and(|t| t >= window_start))
            .count(),
    }
}

pub fn resource_metrics(workers: &[Worker], rates: &CostRates) -> ResourceMetrics {
    let count = |status: WorkerStatus| workers.iter().filter(|w| w.status == status).count();
    let average_utilization_percent = if workers.is_empty() {
        0.0
    } else {
        workers.iter().map(|w| w.utilization_percent).sum::<f64>() / workers.len() as f64
    };

    ResourceMetrics {
        total_workers: workers.len(),
        idle_workers: count(WorkerStatus::Idle),
        busy_workers: count(WorkerStatus::Busy),
        draining_workers: count(WorkerStatus::Draining),
        offline_workers: count(WorkerStatus::Offline),
        total_memory_mb: workers.iter().map(|w| w.memory_total_mb).sum(),
        used_memory_mb: workers.iter().map(|w| w.memory_used_mb).sum(),
        average_utilization_percent,
        estimated_cost_per_hour: workers
            .iter()
            .filter(|w| w.is_online())
            .map(|w| rates.hourly(w.gpu_type))
            .sum(),
    }
}

/// Expected wait (ms) for a new job of `priority`.
///
/// Zero whenever a worker is idle. Otherwise the queued jobs of the same or
/// higher priority, times the mean processing time, spread over busy workers.
pub fn estimate_wait_time(jobs: &[Job], workers: &[Worker], priority: Priority) -> u64 {
    if workers.iter().any(Worker::is_idle) {
        return 0;
    }

    let jobs_ahead = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Queued && j.priority.is_at_least_as_urgent_as(priority))
        .count();
    let average = average_processing_time_ms(jobs).unwrap_or(DEFAULT_PROCESSING_TIME_MS);
    let active = workers
        .iter()
        .filter(|w| w.status == WorkerStatus::Busy)
        .count()
        .max(1);

    (jobs_ahead as f64 * average / active as f64).round() as u64
}

/// Cost of the jobs completed in the trailing `period_ms`.
///
/// Each job is priced at the hourly rate of the GPU it ran on; jobs without a
/// recorded GPU are priced as T4.
pub fn cost_analytics(
    jobs: &[Job],
    workers: &[Worker],
    period_ms: u64,
    now: u64,
    rates: &CostRates,
) -> CostAnalytics {
    let window_start = now.saturating_sub(period_ms);
    let mut analytics = CostAnalytics {
        period_ms,
        ..CostAnalytics::default()
    };

    let in_window = completed(jobs).filter(|j| j.completed_at.is_some_and(|t| t >= window_start));
    for job in in_window {
        let duration = job.actual_duration_ms.unwrap_or(0);
        let gpu = job.gpu_type.unwrap_or(GpuType::T4);
        let cost = duration as f64 / MS_PER_HOUR * rates.hourly(gpu);

        analytics.jobs_completed += 1;
        analytics.total_processing_ms += duration;
        analytics.total_cost += cost;
        *analytics.cost_by_gpu_type.entry(gpu).or_default() += cost;
        *analytics.cost_by_job_type.entry(job.job_type).or_default() += cost;
    }

    let online = workers.iter().filter(|w| w.is_online()).count().max(1);
    let capacity_ms = online as f64 * period_ms as f64;
    if capacity_ms > 0.0 {
        analytics.efficiency_percent = analytics.total_processing_ms as f64 / capacity_ms * 100.0;
    }

    analytics
}
