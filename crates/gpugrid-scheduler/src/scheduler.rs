//! Scheduler: the job lifecycle and the worker pool behind one lock.
//!
//! The `Scheduler` is shared by three kinds of caller:
//! - Producers submitting and cancelling jobs
//! - Workers pulling jobs (`assign`) and reporting results
//! - Maintenance loops sweeping stale workers, timed-out jobs and scaling
//!
//! Every read-modify-write sequence runs under a single `tokio::sync::Mutex`,
//! so dequeue plus worker update in `assign` is one atomic step. Metrics
//! readers copy records out under the lock and compute after releasing it.

use std::sync::Arc;

use gpugrid_autoscale::{Autoscaler, PoolSnapshot, ScaleCallback, ScaleDecision};
use gpugrid_core::{
    Clock, GpuType, GridConfig, JobId, JobType, Priority, system_clock,
};
use gpugrid_metrics::{CostAnalytics, QueueStats, ResourceMetrics};
use gpugrid_state::{FailureOutcome, Job, JobOutcome, JobStatus, Store, Worker};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::PriorityQueue;

/// Per-submission overrides of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub priority: Option<Priority>,
    pub max_retries: Option<u32>,
}

impl SubmitOptions {
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Self::default()
        }
    }
}

/// Usage figures a worker reports with each heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorkerHeartbeat {
    pub memory_used_mb: u64,
    pub utilization_percent: f64,
}

/// State that must change together.
struct Inner {
    queue: PriorityQueue,
    autoscaler: Autoscaler,
    next_sequence: u64,
}

impl Inner {
    /// Queue a job at the position its record holds.
    fn requeue(&mut self, job: &Job) {
        match job.reclaim_slot {
            Some(slot) => self.queue.restore_front(&job.id, job.priority, slot),
            None => self.queue.push_back(&job.id, job.priority, job.sequence),
        }
    }
}

/// The GPU job scheduler.
pub struct Scheduler {
    store: Arc<dyn Store>,
    config: GridConfig,
    inner: Mutex<Inner>,
    clock: Clock,
    /// Receives scale_up/scale_down decisions, if set.
    scale_fn: Option<ScaleCallback>,
}

impl Scheduler {
    /// Create a scheduler over `store`, using the system clock.
    ///
    /// Jobs already in the store are not queued until [`Scheduler::recover`].
    pub fn new(store: Arc<dyn Store>, config: GridConfig) -> Self {
        let autoscaler = Autoscaler::new(config.autoscaling.clone());
        Self {
            store,
            config,
            inner: Mutex::new(Inner {
                queue: PriorityQueue::new(),
                autoscaler,
                next_sequence: 1,
            }),
            clock: system_clock(),
            scale_fn: None,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Set the callback that acts on scaling decisions.
    pub fn with_scale_fn(mut self, f: ScaleCallback) -> Self {
        self.scale_fn = Some(f);
        self
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Rebuild the queue from the store after a restart.
    ///
    /// Queued jobs go back in submission order, except reclaimed ones which
    /// keep their head-of-class slot. Pending jobs are enqueued. Returns the
    /// number of jobs now queued.
    pub async fn recover(&self) -> SchedulerResult<usize> {
        let mut inner = self.inner.lock().await;
        let jobs = self.store.scan_jobs()?;

        let mut max_sequence = 0;
        for mut job in jobs {
            max_sequence = max_sequence.max(job.sequence);
            match job.status {
                JobStatus::Pending => {
                    job.enqueue()
                        .map_err(|e| SchedulerError::transition(&job.id, e))?;
                    self.store.put_job(&job)?;
                }
                JobStatus::Queued => {}
                _ => continue,
            }
            inner.requeue(&job);
        }
        inner.next_sequence = inner.next_sequence.max(max_sequence + 1);

        let queued = inner.queue.len();
        info!(queued, next_sequence = inner.next_sequence, "scheduler state recovered");
        Ok(queued)
    }

    // ── Jobs ──────────────────────────────────────────────────────

    /// Create a job, queue it, and run an autoscale check.
    ///
    /// Once the job is stored the submission has succeeded; a failed
    /// autoscale check is only logged.
    pub async fn submit(
        &self,
        job_type: JobType,
        user_id: &str,
        payload: serde_json::Value,
        opts: SubmitOptions,
    ) -> SchedulerResult<Job> {
        let (job, decision) = {
            let mut inner = self.inner.lock().await;
            let now = self.now();

            let sequence = inner.next_sequence;
            inner.next_sequence += 1;

            let mut job = Job::new(
                uuid::Uuid::new_v4().to_string(),
                job_type,
                user_id.to_string(),
                payload,
                opts.priority.unwrap_or(self.config.scheduler.default_priority),
                opts.max_retries.unwrap_or(self.config.scheduler.max_retries),
                sequence,
                now,
            );
            job.enqueue()
                .map_err(|e| SchedulerError::transition(&job.id, e))?;
            self.store.put_job(&job)?;
            inner.queue.push_back(&job.id, job.priority, job.sequence);

            info!(
                job_id = %job.id,
                job_type = %job.job_type,
                user_id = %job.user_id,
                priority = %job.priority,
                queue_len = inner.queue.len(),
                "job submitted"
            );

            let decision = match self.evaluate_scaling(&mut inner, now) {
                Ok(decision) => Some(decision),
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "autoscale check after submit failed");
                    None
                }
            };
            (job, decision)
        };

        if let Some(decision) = decision {
            self.dispatch_scale(&decision).await;
        }
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> SchedulerResult<Option<Job>> {
        Ok(self.store.get_job(job_id)?)
    }

    /// Every job, oldest submission first.
    pub async fn list_jobs(&self) -> SchedulerResult<Vec<Job>> {
        let mut jobs = self.store.scan_jobs()?;
        jobs.sort_by_key(|j| (j.created_at, j.sequence));
        Ok(jobs)
    }

    /// Jobs submitted by `user_id`, oldest first.
    pub async fn jobs_for_user(&self, user_id: &str) -> SchedulerResult<Vec<Job>> {
        let mut jobs = self.list_jobs().await?;
        jobs.retain(|j| j.user_id == user_id);
        Ok(jobs)
    }

    /// Cancel a job that hasn't started.
    ///
    /// Returns false for unknown jobs and for jobs that are processing or
    /// already finished.
    pub async fn cancel(&self, job_id: &str) -> SchedulerResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(mut job) = self.store.get_job(job_id)? else {
            debug!(%job_id, "cancel of unknown job");
            return Ok(false);
        };

        if let Err(e) = job.cancel() {
            debug!(%job_id, status = %e.from, "cancel refused");
            return Ok(false);
        }
        self.store.put_job(&job)?;
        inner.queue.remove(job_id);

        info!(%job_id, "job cancelled");
        Ok(true)
    }

    // ── Workers ───────────────────────────────────────────────────

    /// Register (or re-register) a worker as idle.
    ///
    /// Re-registering overwrites the previous record. A job the previous
    /// incarnation was still processing is put back at the head of its class.
    pub async fn register_worker(
        &self,
        worker_id: &str,
        node_pool: &str,
        gpu_type: GpuType,
        memory_total_mb: u64,
    ) -> SchedulerResult<Worker> {
        let mut inner = self.inner.lock().await;
        let now = self.now();

        if let Some(previous) = self.store.get_worker(worker_id)?
            && let Some(job_id) = previous.current_job_id
        {
            self.reclaim(&mut inner, &job_id, worker_id)?;
        }

        let worker = Worker::register(worker_id, node_pool, gpu_type, memory_total_mb, now);
        self.store.put_worker(&worker)?;

        info!(%worker_id, %node_pool, gpu = %gpu_type, memory_total_mb, "worker registered");
        Ok(worker)
    }

    /// Record a heartbeat. Returns false if the worker is unknown.
    pub async fn update_heartbeat(
        &self,
        worker_id: &str,
        heartbeat: WorkerHeartbeat,
    ) -> SchedulerResult<bool> {
        let _inner = self.inner.lock().await;
        let Some(mut worker) = self.store.get_worker(worker_id)? else {
            debug!(%worker_id, "heartbeat from unknown worker ignored");
            return Ok(false);
        };

        let was_offline = !worker.is_online();
        worker.heartbeat(
            heartbeat.memory_used_mb,
            heartbeat.utilization_percent,
            self.now(),
        );
        self.store.put_worker(&worker)?;

        if was_offline {
            info!(%worker_id, "offline worker is back");
        }
        Ok(true)
    }

    /// Stop handing new jobs to a worker. Its current job runs to the end.
    ///
    /// Returns false if the worker is unknown or offline.
    pub async fn drain_worker(&self, worker_id: &str) -> SchedulerResult<bool> {
        let _inner = self.inner.lock().await;
        let Some(mut worker) = self.store.get_worker(worker_id)? else {
            return Ok(false);
        };
        if !worker.drain() {
            return Ok(false);
        }
        self.store.put_worker(&worker)?;

        info!(%worker_id, current_job = ?worker.current_job_id, "worker draining");
        Ok(true)
    }

    pub async fn get_worker(&self, worker_id: &str) -> SchedulerResult<Option<Worker>> {
        Ok(self.store.get_worker(worker_id)?)
    }

    /// Every worker, sorted by id.
    pub async fn list_workers(&self) -> SchedulerResult<Vec<Worker>> {
        let mut workers = self.store.scan_workers()?;
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        Ok(workers)
    }

    // ── Dispatch ──────────────────────────────────────────────────

    /// Hand the next queued job to an idle worker.
    ///
    /// Returns `None` if the worker is unknown, not idle, or the queue holds
    /// no job that is still queued.
    pub async fn assign(&self, worker_id: &str) -> SchedulerResult<Option<Job>> {
        let mut inner = self.inner.lock().await;

        let Some(mut worker) = self.store.get_worker(worker_id)? else {
            debug!(%worker_id, "assign for unknown worker");
            return Ok(None);
        };
        if !worker.is_idle() {
            debug!(%worker_id, status = %worker.status, "assign for worker that is not idle");
            return Ok(None);
        }

        let Some(mut job) = self.dequeue(&mut inner)? else {
            return Ok(None);
        };

        // The popped entry goes back on any failure below.
        let queued = job.clone();
        let idle = worker.clone();
        if let Err(e) = job.start(worker_id, worker.gpu_type, self.now()) {
            inner.requeue(&queued);
            return Err(SchedulerError::transition(&job.id, e));
        }
        worker.take_job(&job.id);

        if let Err(e) = self.store.put_worker(&worker) {
            inner.requeue(&queued);
            return Err(e.into());
        }
        if let Err(e) = self.store.put_job(&job) {
            if let Err(restore) = self.store.put_worker(&idle) {
                warn!(%worker_id, error = %restore, "failed to restore idle worker");
            }
            inner.requeue(&queued);
            return Err(e.into());
        }

        info!(
            job_id = %job.id,
            %worker_id,
            job_type = %job.job_type,
            wait_ms = job.wait_time_ms().unwrap_or(0),
            "job assigned"
        );
        Ok(Some(job))
    }

    /// Pop the head, discarding ids whose job is gone or no longer queued.
    fn dequeue(&self, inner: &mut Inner) -> SchedulerResult<Option<Job>> {
        while let Some(job_id) = inner.queue.pop() {
            match self.store.get_job(&job_id)? {
                Some(job) if job.status == JobStatus::Queued => return Ok(Some(job)),
                Some(job) => {
                    debug!(%job_id, status = %job.status, "discarding stale queue entry");
                }
                None => {
                    debug!(%job_id, "discarding queue entry for missing job");
                }
            }
        }
        Ok(None)
    }

    /// Mark a processing job completed and free its worker.
    pub async fn complete(
        &self,
        job_id: &str,
        result: serde_json::Value,
    ) -> SchedulerResult<Job> {
        let _inner = self.inner.lock().await;
        let mut job = self
            .store
            .get_job(job_id)?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;

        job.complete(result, self.now())
            .map_err(|e| SchedulerError::transition(job_id, e))?;
        self.store.put_job(&job)?;
        if let Some(worker_id) = &job.worker_id {
            self.release_worker(worker_id, job_id, JobOutcome::Completed)?;
        }

        info!(
            %job_id,
            worker_id = job.worker_id.as_deref().unwrap_or("-"),
            duration_ms = job.actual_duration_ms.unwrap_or(0),
            "job completed"
        );
        Ok(job)
    }

    /// Record a failed attempt. The job is requeued while retries remain.
    pub async fn fail(&self, job_id: &str, error: &str) -> SchedulerResult<Job> {
        let mut inner = self.inner.lock().await;
        let now = self.now();
        self.fail_locked(&mut inner, job_id, error, now)
    }

    fn fail_locked(
        &self,
        inner: &mut Inner,
        job_id: &str,
        error: &str,
        now: u64,
    ) -> SchedulerResult<Job> {
        let mut job = self
            .store
            .get_job(job_id)?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;

        let worker_id = job.worker_id.clone();
        let outcome = job
            .fail(error, now)
            .map_err(|e| SchedulerError::transition(job_id, e))?;
        self.store.put_job(&job)?;
        if outcome == FailureOutcome::Requeued {
            inner.queue.push_back(&job.id, job.priority, job.sequence);
        }
        if let Some(worker_id) = &worker_id {
            self.release_worker(worker_id, job_id, JobOutcome::Failed)?;
        }

        match outcome {
            FailureOutcome::Requeued => {
                warn!(
                    %job_id,
                    worker_id = worker_id.as_deref().unwrap_or("-"),
                    retry = job.retry_count,
                    max_retries = job.max_retries,
                    %error,
                    "job failed, requeued"
                );
            }
            FailureOutcome::Exhausted => {
                info!(
                    %job_id,
                    worker_id = worker_id.as_deref().unwrap_or("-"),
                    attempts = job.failures.len(),
                    %error,
                    "job failed, retries exhausted"
                );
            }
        }
        Ok(job)
    }

    fn release_worker(
        &self,
        worker_id: &str,
        job_id: &str,
        outcome: JobOutcome,
    ) -> SchedulerResult<()> {
        let Some(mut worker) = self.store.get_worker(worker_id)? else {
            return Ok(());
        };
        if worker.release_job(job_id, outcome) {
            self.store.put_worker(&worker)?;
        } else {
            debug!(%worker_id, %job_id, "worker no longer holds job");
        }
        Ok(())
    }

    /// Put a processing job owned by `worker_id` back at the head of its class.
    fn reclaim(&self, inner: &mut Inner, job_id: &str, worker_id: &str) -> SchedulerResult<bool> {
        let Some(mut job) = self.store.get_job(job_id)? else {
            return Ok(false);
        };
        if job.status != JobStatus::Processing || job.worker_id.as_deref() != Some(worker_id) {
            return Ok(false);
        }

        let slot = inner.queue.push_front(&job.id, job.priority);
        let saved = job
            .reclaim(slot)
            .map_err(|e| SchedulerError::transition(job_id, e))
            .and_then(|()| self.store.put_job(&job).map_err(SchedulerError::from));
        if let Err(e) = saved {
            inner.queue.remove(job_id);
            return Err(e);
        }

        warn!(%job_id, %worker_id, priority = %job.priority, "job reclaimed from lost worker");
        Ok(true)
    }

    // ── Maintenance ───────────────────────────────────────────────

    /// Mark workers silent for longer than `stale_threshold_ms` offline and
    /// requeue their jobs. Returns the number of workers newly marked offline.
    pub async fn sweep_offline_workers(&self, stale_threshold_ms: u64) -> SchedulerResult<usize> {
        let mut inner = self.inner.lock().await;
        let now = self.now();

        let mut marked = 0;
        for mut worker in self.store.scan_workers()? {
            if !worker.is_online() || !worker.is_stale(now, stale_threshold_ms) {
                continue;
            }
            let silent_ms = now.saturating_sub(worker.last_heartbeat);
            let held = worker.mark_offline();
            // Requeue first: a worker still marked online gets swept again.
            if let Some(job_id) = &held {
                self.reclaim(&mut inner, job_id, &worker.worker_id)?;
            }
            self.store.put_worker(&worker)?;
            marked += 1;

            info!(worker_id = %worker.worker_id, silent_ms, "worker marked offline");
        }
        Ok(marked)
    }

    /// Fail every processing job that has run longer than the job timeout.
    /// Returns the ids of the failed jobs.
    pub async fn sweep_timed_out_jobs(&self) -> SchedulerResult<Vec<JobId>> {
        let mut inner = self.inner.lock().await;
        let now = self.now();
        let timeout_ms = self.config.scheduler.job_timeout_ms;

        let mut timed_out: Vec<Job> = self
            .store
            .scan_jobs()?
            .into_iter()
            .filter(|j| {
                j.status == JobStatus::Processing
                    && j.started_at
                        .is_some_and(|started| now.saturating_sub(started) > timeout_ms)
            })
            .collect();
        timed_out.sort_by_key(|j| j.sequence);

        let error = format!("job timed out after {timeout_ms}ms");
        let mut ids = Vec::with_capacity(timed_out.len());
        for job in timed_out {
            warn!(job_id = %job.id, timeout_ms, "job timed out");
            self.fail_locked(&mut inner, &job.id, &error, now)?;
            ids.push(job.id);
        }
        Ok(ids)
    }

    /// Evaluate the pool and hand any scaling decision to the scale callback.
    pub async fn check_auto_scaling(&self) -> SchedulerResult<ScaleDecision> {
        let decision = {
            let mut inner = self.inner.lock().await;
            let now = self.now();
            self.evaluate_scaling(&mut inner, now)?
        };
        self.dispatch_scale(&decision).await;
        Ok(decision)
    }

    fn evaluate_scaling(&self, inner: &mut Inner, now: u64) -> SchedulerResult<ScaleDecision> {
        let workers = self.store.scan_workers()?;
        let snapshot = PoolSnapshot::from_workers(inner.queue.len(), &workers, now);
        Ok(inner.autoscaler.evaluate(&snapshot, now))
    }

    async fn dispatch_scale(&self, decision: &ScaleDecision) {
        if !decision.is_action() {
            return;
        }
        let Some(scale_fn) = &self.scale_fn else {
            return;
        };
        if let Err(e) = scale_fn(decision.clone()).await {
            warn!(action = ?decision.action, error = %e, "scale callback failed");
        }
    }

    // ── Metrics ───────────────────────────────────────────────────

    /// Number of ids currently in the queue.
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    async fn snapshot(&self) -> SchedulerResult<(usize, Vec<Job>, Vec<Worker>, u64)> {
        let inner = self.inner.lock().await;
        Ok((
            inner.queue.len(),
            self.store.scan_jobs()?,
            self.store.scan_workers()?,
            self.now(),
        ))
    }

    pub async fn queue_stats(&self) -> SchedulerResult<QueueStats> {
        let (pending, jobs, _, now) = self.snapshot().await?;
        Ok(gpugrid_metrics::queue_stats(&jobs, pending, now))
    }

    pub async fn resource_metrics(&self) -> SchedulerResult<ResourceMetrics> {
        let (_, _, workers, _) = self.snapshot().await?;
        Ok(gpugrid_metrics::resource_metrics(&workers, &self.config.costs))
    }

    /// Expected wait in ms for a job submitted now at `priority`.
    pub async fn estimate_wait_time(&self, priority: Priority) -> SchedulerResult<u64> {
        let (_, jobs, workers, _) = self.snapshot().await?;
        Ok(gpugrid_metrics::estimate_wait_time(&jobs, &workers, priority))
    }

    /// Cost of the jobs completed in the trailing `period_ms`.
    pub async fn cost_analytics(&self, period_ms: u64) -> SchedulerResult<CostAnalytics> {
        let (_, jobs, workers, now) = self.snapshot().await?;
        Ok(gpugrid_metrics::cost_analytics(
            &jobs,
            &workers,
            period_ms,
            now,
            &self.config.costs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gpugrid_autoscale::ScaleFuture;
    use gpugrid_core::ManualClock;
    use gpugrid_state::{MemoryStore, WorkerStatus};
    use serde_json::json;

    fn test_scheduler() -> (Scheduler, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let scheduler = Scheduler::new(Arc::new(MemoryStore::new()), GridConfig::default())
            .with_clock(clock.clock());
        (scheduler, clock)
    }

    async fn submit(scheduler: &Scheduler, priority: Priority) -> Job {
        scheduler
            .submit(
                JobType::FaceDetection,
                "user-1",
                json!({"frame": 1}),
                SubmitOptions::with_priority(priority),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn submit_queues_with_defaults() {
        let (scheduler, _) = test_scheduler();
        let job = scheduler
            .submit(
                JobType::ModelTraining,
                "user-9",
                json!({"epochs": 10}),
                SubmitOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.priority, Priority::Normal);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.estimated_duration_ms, 1_800_000);
        assert_eq!(job.created_at, 1_000_000);
        assert_eq!(scheduler.pending_len().await, 1);

        let stored = scheduler.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored, job);
    }

    #[tokio::test]
    async fn submissions_get_unique_ids_and_increasing_sequences() {
        let (scheduler, _) = test_scheduler();
        let a = submit(&scheduler, Priority::Normal).await;
        let b = submit(&scheduler, Priority::Normal).await;
        assert_ne!(a.id, b.id);
        assert!(b.sequence > a.sequence);
    }

    #[tokio::test]
    async fn assign_unknown_or_busy_worker_returns_none() {
        let (scheduler, _) = test_scheduler();
        submit(&scheduler, Priority::Normal).await;
        submit(&scheduler, Priority::Normal).await;

        assert!(scheduler.assign("ghost").await.unwrap().is_none());

        scheduler
            .register_worker("w1", "pool-a", GpuType::T4, 16_000)
            .await
            .unwrap();
        assert!(scheduler.assign("w1").await.unwrap().is_some());
        assert!(scheduler.assign("w1").await.unwrap().is_none());
        assert_eq!(scheduler.pending_len().await, 1);
    }

    #[tokio::test]
    async fn assign_on_empty_queue_leaves_worker_idle() {
        let (scheduler, _) = test_scheduler();
        scheduler
            .register_worker("w1", "pool-a", GpuType::T4, 16_000)
            .await
            .unwrap();

        assert!(scheduler.assign("w1").await.unwrap().is_none());
        let worker = scheduler.get_worker("w1").await.unwrap().unwrap();
        assert_eq!(worker.status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn assign_records_worker_and_gpu() {
        let (scheduler, clock) = test_scheduler();
        let job = submit(&scheduler, Priority::Normal).await;
        scheduler
            .register_worker("w1", "pool-a", GpuType::A100, 40_000)
            .await
            .unwrap();
        clock.advance(500);

        let assigned = scheduler.assign("w1").await.unwrap().unwrap();
        assert_eq!(assigned.id, job.id);
        assert_eq!(assigned.status, JobStatus::Processing);
        assert_eq!(assigned.worker_id.as_deref(), Some("w1"));
        assert_eq!(assigned.gpu_type, Some(GpuType::A100));
        assert_eq!(assigned.started_at, Some(1_000_500));

        let worker = scheduler.get_worker("w1").await.unwrap().unwrap();
        assert_eq!(worker.status, WorkerStatus::Busy);
        assert_eq!(worker.current_job_id.as_deref(), Some(job.id.as_str()));
    }

    #[tokio::test]
    async fn complete_and_fail_unknown_job_error() {
        let (scheduler, _) = test_scheduler();
        let err = scheduler.complete("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, SchedulerError::JobNotFound(id) if id == "nope"));

        let err = scheduler.fail("nope", "boom").await.unwrap_err();
        assert!(matches!(err, SchedulerError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn complete_of_queued_job_is_invalid() {
        let (scheduler, _) = test_scheduler();
        let job = submit(&scheduler, Priority::Normal).await;

        let err = scheduler.complete(&job.id, json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidTransition { status: JobStatus::Queued, .. }
        ));
        let stored = scheduler.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn complete_records_duration() {
        let (scheduler, clock) = test_scheduler();
        let job = submit(&scheduler, Priority::Normal).await;
        scheduler
            .register_worker("w1", "pool-a", GpuType::T4, 16_000)
            .await
            .unwrap();
        scheduler.assign("w1").await.unwrap();
        clock.advance(1_750);

        let done = scheduler.complete(&job.id, json!({"faces": 3})).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result, Some(json!({"faces": 3})));
        assert_eq!(done.actual_duration_ms, Some(1_750));
        assert_eq!(done.completed_at, Some(1_001_750));
    }

    #[tokio::test]
    async fn cancel_unknown_and_finished_jobs_refused() {
        let (scheduler, _) = test_scheduler();
        assert!(!scheduler.cancel("nope").await.unwrap());

        let job = submit(&scheduler, Priority::Normal).await;
        assert!(scheduler.cancel(&job.id).await.unwrap());
        assert!(!scheduler.cancel(&job.id).await.unwrap());
        assert_eq!(scheduler.pending_len().await, 0);
    }

    #[tokio::test]
    async fn draining_worker_gets_no_jobs_and_stays_draining() {
        let (scheduler, _) = test_scheduler();
        let job = submit(&scheduler, Priority::Normal).await;
        submit(&scheduler, Priority::Normal).await;
        scheduler
            .register_worker("w1", "pool-a", GpuType::T4, 16_000)
            .await
            .unwrap();
        scheduler.assign("w1").await.unwrap();

        assert!(scheduler.drain_worker("w1").await.unwrap());
        assert!(!scheduler.drain_worker("ghost").await.unwrap());

        scheduler.complete(&job.id, json!({})).await.unwrap();
        let worker = scheduler.get_worker("w1").await.unwrap().unwrap();
        assert_eq!(worker.status, WorkerStatus::Draining);
        assert_eq!(worker.current_job_id, None);
        assert_eq!(worker.jobs_completed, 1);

        assert!(scheduler.assign("w1").await.unwrap().is_none());
        assert_eq!(scheduler.pending_len().await, 1);
    }

    #[tokio::test]
    async fn heartbeat_updates_usage_and_revives_offline_worker() {
        let (scheduler, clock) = test_scheduler();
        scheduler
            .register_worker("w1", "pool-a", GpuType::V100, 32_000)
            .await
            .unwrap();

        assert!(
            !scheduler
                .update_heartbeat("ghost", WorkerHeartbeat::default())
                .await
                .unwrap()
        );

        clock.advance(40_000);
        assert_eq!(scheduler.sweep_offline_workers(30_000).await.unwrap(), 1);

        let beat = WorkerHeartbeat {
            memory_used_mb: 12_000,
            utilization_percent: 55.0,
        };
        assert!(scheduler.update_heartbeat("w1", beat).await.unwrap());

        let worker = scheduler.get_worker("w1").await.unwrap().unwrap();
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert_eq!(worker.memory_used_mb, 12_000);
        assert_eq!(worker.utilization_percent, 55.0);
        assert_eq!(worker.last_heartbeat, 1_040_000);
    }

    #[tokio::test]
    async fn sweep_counts_only_newly_offline_workers() {
        let (scheduler, clock) = test_scheduler();
        scheduler
            .register_worker("w1", "pool-a", GpuType::T4, 16_000)
            .await
            .unwrap();
        clock.advance(30_000);
        assert_eq!(scheduler.sweep_offline_workers(30_000).await.unwrap(), 0);

        clock.advance(1);
        assert_eq!(scheduler.sweep_offline_workers(30_000).await.unwrap(), 1);
        assert_eq!(scheduler.sweep_offline_workers(30_000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reregistering_busy_worker_requeues_its_job() {
        let (scheduler, _) = test_scheduler();
        let job = submit(&scheduler, Priority::Normal).await;
        scheduler
            .register_worker("w1", "pool-a", GpuType::T4, 16_000)
            .await
            .unwrap();
        scheduler.assign("w1").await.unwrap();

        let worker = scheduler
            .register_worker("w1", "pool-b", GpuType::A100, 40_000)
            .await
            .unwrap();
        assert_eq!(worker.status, WorkerStatus::Idle);

        let stored = scheduler.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(scheduler.pending_len().await, 1);
    }

    #[tokio::test]
    async fn timed_out_jobs_fail_through_retry_path() {
        let (scheduler, clock) = test_scheduler();
        let job = scheduler
            .submit(
                JobType::FaceDetection,
                "user-1",
                json!({}),
                SubmitOptions {
                    priority: None,
                    max_retries: Some(0),
                },
            )
            .await
            .unwrap();
        scheduler
            .register_worker("w1", "pool-a", GpuType::T4, 16_000)
            .await
            .unwrap();
        scheduler.assign("w1").await.unwrap();

        clock.advance(scheduler.config().scheduler.job_timeout_ms);
        assert!(scheduler.sweep_timed_out_jobs().await.unwrap().is_empty());

        clock.advance(1);
        let ids = scheduler.sweep_timed_out_jobs().await.unwrap();
        assert_eq!(ids, vec![job.id.clone()]);

        let stored = scheduler.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("job timed out after 1800000ms"));

        let worker = scheduler.get_worker("w1").await.unwrap().unwrap();
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert_eq!(worker.jobs_failed, 1);
    }

    #[tokio::test]
    async fn scale_callback_receives_actions_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut config = GridConfig::default();
        config.autoscaling.scale_up_threshold = 2;
        let clock = ManualClock::new(1_000_000);
        let scheduler = Scheduler::new(Arc::new(MemoryStore::new()), config)
            .with_clock(clock.clock())
            .with_scale_fn(Box::new(move |decision: ScaleDecision| -> ScaleFuture {
                let seen = seen.clone();
                Box::pin(async move {
                    assert!(decision.is_action());
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }));

        submit(&scheduler, Priority::Normal).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        submit(&scheduler, Priority::Normal).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Inside the cooldown window.
        submit(&scheduler, Priority::Normal).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_scale_callback_does_not_fail_submit() {
        let mut config = GridConfig::default();
        config.autoscaling.scale_up_threshold = 1;
        let scheduler = Scheduler::new(Arc::new(MemoryStore::new()), config).with_scale_fn(
            Box::new(|_: ScaleDecision| -> ScaleFuture {
                Box::pin(async { Err(anyhow::anyhow!("node pool unavailable")) })
            }),
        );

        let job = submit(&scheduler, Priority::High).await;
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn metrics_reflect_records() {
        let (scheduler, clock) = test_scheduler();
        let job = submit(&scheduler, Priority::Normal).await;
        submit(&scheduler, Priority::Normal).await;
        scheduler
            .register_worker("w1", "pool-a", GpuType::A100, 40_000)
            .await
            .unwrap();
        scheduler.assign("w1").await.unwrap();
        clock.advance(3_600_000);
        scheduler.complete(&job.id, json!({})).await.unwrap();

        let stats = scheduler.queue_stats().await.unwrap();
        assert_eq!(stats.pending_jobs, 1);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.throughput_per_minute, 1);
        assert_eq!(stats.average_processing_time_ms, 3_600_000.0);

        let resources = scheduler.resource_metrics().await.unwrap();
        assert_eq!(resources.idle_workers, 1);
        assert_eq!(resources.estimated_cost_per_hour, 3.67);

        let costs = scheduler.cost_analytics(3_600_000).await.unwrap();
        assert_eq!(costs.jobs_completed, 1);
        assert!((costs.total_cost - 3.67).abs() < 1e-9);

        assert_eq!(scheduler.estimate_wait_time(Priority::Normal).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_jobs_and_jobs_for_user() {
        let (scheduler, clock) = test_scheduler();
        let a = submit(&scheduler, Priority::Low).await;
        clock.advance(10);
        scheduler
            .submit(JobType::PreviewGeneration, "user-2", json!({}), SubmitOptions::default())
            .await
            .unwrap();
        clock.advance(10);
        let c = submit(&scheduler, Priority::High).await;

        let all = scheduler.list_jobs().await.unwrap();
        assert_eq!(all.len(), 3);

        let mine: Vec<_> = scheduler
            .jobs_for_user("user-1")
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(mine, vec![a.id, c.id]);
        assert!(scheduler.jobs_for_user("nobody").await.unwrap().is_empty());
    }
}
