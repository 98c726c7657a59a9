//! Job and worker records, and the only code allowed to change their status.
//!
//! Each transition method checks its precondition and returns
//! [`InvalidTransition`] without touching the record when it does not hold.

use gpugrid_core::{GpuType, JobId, JobType, Priority, UserId, WorkerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Job ───────────────────────────────────────────────────────────

/// Lifecycle status of a job.
///
/// ```text
/// pending -> queued -> processing -> completed
///            queued -> cancelled
///            processing -> queued      (retry, reclaim)
///            processing -> failed      (retries exhausted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition was attempted from a status that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} from status {from}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub action: &'static str,
}

/// One failed attempt, kept in submission order on the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    /// 1-based attempt number that failed.
    pub attempt: u32,
    pub error: String,
    pub failed_at: u64,
    pub worker_id: Option<WorkerId>,
}

/// What a failure did to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back in the queue for another attempt.
    Requeued,
    /// Retry budget spent; the job is now `failed`.
    Exhausted,
}

/// A unit of GPU work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub user_id: UserId,
    pub priority: Priority,
    pub status: JobStatus,
    /// Opaque input handed to the worker.
    pub payload: serde_json::Value,
    /// Opaque output reported on completion.
    pub result: Option<serde_json::Value>,
    /// Error of the terminal failure, if any.
    pub error: Option<String>,
    /// Every failed attempt, oldest first.
    #[serde(default)]
    pub failures: Vec<JobFailure>,
    /// Submission order; FIFO tie-break within a priority class.
    pub sequence: u64,
    /// Head-of-class queue slot granted when the job was reclaimed from a
    /// lost worker. Cleared once the job starts again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaim_slot: Option<i64>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub estimated_duration_ms: u64,
    pub actual_duration_ms: Option<u64>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Worker currently (or most recently) running the job.
    pub worker_id: Option<WorkerId>,
    /// GPU type of the worker the job was last assigned to.
    pub gpu_type: Option<GpuType>,
}

impl Job {
    /// Build a freshly submitted job in `pending`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: JobId,
        job_type: JobType,
        user_id: UserId,
        payload: serde_json::Value,
        priority: Priority,
        max_retries: u32,
        sequence: u64,
        now: u64,
    ) -> Self {
        Self {
            id,
            job_type,
            user_id,
            priority,
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            failures: Vec::new(),
            sequence,
            reclaim_slot: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            estimated_duration_ms: job_type.estimated_duration_ms(),
            actual_duration_ms: None,
            retry_count: 0,
            max_retries,
            worker_id: None,
            gpu_type: None,
        }
    }

    fn require(&self, allowed: &[JobStatus], action: &'static str) -> Result<(), InvalidTransition> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    /// pending -> queued.
    pub fn enqueue(&mut self) -> Result<(), InvalidTransition> {
        self.require(&[JobStatus::Pending], "enqueue")?;
        self.status = JobStatus::Queued;
        Ok(())
    }

    /// queued -> processing on `worker_id`.
    pub fn start(
        &mut self,
        worker_id: &str,
        gpu_type: GpuType,
        now: u64,
    ) -> Result<(), InvalidTransition> {
        self.require(&[JobStatus::Queued], "start")?;
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.reclaim_slot = None;
        self.worker_id = Some(worker_id.to_string());
        self.gpu_type = Some(gpu_type);
        Ok(())
    }

    /// processing -> completed.
    pub fn complete(
        &mut self,
        result: serde_json::Value,
        now: u64,
    ) -> Result<(), InvalidTransition> {
        self.require(&[JobStatus::Processing], "complete")?;
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.finish(now);
        Ok(())
    }

    /// processing -> queued while retry budget remains, else -> failed.
    ///
    /// `retry_count` counts granted retries, so it never exceeds `max_retries`.
    pub fn fail(&mut self, error: &str, now: u64) -> Result<FailureOutcome, InvalidTransition> {
        self.require(&[JobStatus::Processing], "fail")?;
        self.failures.push(JobFailure {
            attempt: self.retry_count + 1,
            error: error.to_string(),
            failed_at: now,
            worker_id: self.worker_id.clone(),
        });

        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.return_to_queue();
            Ok(FailureOutcome::Requeued)
        } else {
            self.status = JobStatus::Failed;
            self.error = Some(error.to_string());
            self.finish(now);
            Ok(FailureOutcome::Exhausted)
        }
    }

    /// processing -> queued at `slot` because the owning worker vanished.
    /// Not a retry.
    pub fn reclaim(&mut self, slot: i64) -> Result<(), InvalidTransition> {
        self.require(&[JobStatus::Processing], "reclaim")?;
        self.return_to_queue();
        self.reclaim_slot = Some(slot);
        Ok(())
    }

    /// pending|queued -> cancelled.
    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        self.require(&[JobStatus::Pending, JobStatus::Queued], "cancel")?;
        self.status = JobStatus::Cancelled;
        Ok(())
    }

    fn return_to_queue(&mut self) {
        self.status = JobStatus::Queued;
        self.worker_id = None;
        self.started_at = None;
    }

    fn finish(&mut self, now: u64) {
        self.completed_at = Some(now);
        self.actual_duration_ms = Some(
            self.started_at
                .map(|started| now.saturating_sub(started))
                .unwrap_or(0),
        );
    }

    /// `started_at - created_at`, once the job has started.
    pub fn wait_time_ms(&self) -> Option<u64> {
        self.started_at
            .map(|started| started.saturating_sub(self.created_at))
    }
}

// ── Worker ────────────────────────────────────────────────────────

/// Status of a GPU worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Offline,
    /// Finishing its current job; takes no new work.
    Draining,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Offline => "offline",
            WorkerStatus::Draining => "draining",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a worker's job ended, for its counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

/// A GPU execution slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: WorkerId,
    pub node_pool: String,
    pub gpu_type: GpuType,
    pub status: WorkerStatus,
    pub current_job_id: Option<JobId>,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub utilization_percent: f64,
    pub last_heartbeat: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

impl Worker {
    pub fn register(
        worker_id: &str,
        node_pool: &str,
        gpu_type: GpuType,
        memory_total_mb: u64,
        now: u64,
    ) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            node_pool: node_pool.to_string(),
            gpu_type,
            status: WorkerStatus::Idle,
            current_job_id: None,
            memory_used_mb: 0,
            memory_total_mb,
            utilization_percent: 0.0,
            last_heartbeat: now,
            jobs_completed: 0,
            jobs_failed: 0,
        }
    }

    /// Refresh liveness and usage. An offline worker that heartbeats is idle again.
    pub fn heartbeat(&mut self, memory_used_mb: u64, utilization_percent: f64, now: u64) {
        self.last_heartbeat = now;
        self.memory_used_mb = memory_used_mb;
        self.utilization_percent = utilization_percent;
        if self.status == WorkerStatus::Offline {
            self.status = WorkerStatus::Idle;
            self.current_job_id = None;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == WorkerStatus::Idle
    }

    pub fn is_online(&self) -> bool {
        self.status != WorkerStatus::Offline
    }

    /// True if the last heartbeat is older than `threshold_ms`.
    pub fn is_stale(&self, now: u64, threshold_ms: u64) -> bool {
        now.saturating_sub(self.last_heartbeat) > threshold_ms
    }

    /// idle -> busy with `job_id`. Returns false if the worker is not idle.
    pub fn take_job(&mut self, job_id: &str) -> bool {
        if !self.is_idle() {
            return false;
        }
        self.status = WorkerStatus::Busy;
        self.current_job_id = Some(job_id.to_string());
        true
    }

    /// Detach `job_id` and count the outcome. busy -> idle; draining stays draining.
    ///
    /// Returns false (and changes nothing) if the worker isn't holding `job_id`.
    pub fn release_job(&mut self, job_id: &str, outcome: JobOutcome) -> bool {
        if self.current_job_id.as_deref() != Some(job_id) {
            return false;
        }
        self.current_job_id = None;
        match outcome {
            JobOutcome::Completed => self.jobs_completed += 1,
            JobOutcome::Failed => self.jobs_failed += 1,
        }
        if self.status == WorkerStatus::Busy {
            self.status = WorkerStatus::Idle;
        }
        true
    }

    /// idle|busy -> draining. Returns false for offline workers.
    pub fn drain(&mut self) -> bool {
        if self.status == WorkerStatus::Offline {
            return false;
        }
        self.status = WorkerStatus::Draining;
        true
    }

    /// Mark offline and hand back the job it was holding, if any.
    pub fn mark_offline(&mut self) -> Option<JobId> {
        self.status = WorkerStatus::Offline;
        self.current_job_id.take()
    }
}
