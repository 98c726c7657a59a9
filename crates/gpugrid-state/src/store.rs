//! The storage seam between scheduling logic and a backend.

use crate::error::StateResult;
use crate::types::{Job, Worker};

/// Keyed storage for job and worker records.
///
/// Implementations only need per-call atomicity; the scheduler serializes
/// its read-modify-write sequences itself.
pub trait Store: Send + Sync {
    fn get_job(&self, id: &str) -> StateResult<Option<Job>>;

    /// Insert or overwrite a job.
    fn put_job(&self, job: &Job) -> StateResult<()>;

    /// Remove a job. Returns true if it existed.
    fn delete_job(&self, id: &str) -> StateResult<bool>;

    /// Every stored job, in no particular order.
    fn scan_jobs(&self) -> StateResult<Vec<Job>>;

    fn get_worker(&self, id: &str) -> StateResult<Option<Worker>>;

    /// Insert or overwrite a worker.
    fn put_worker(&self, worker: &Worker) -> StateResult<()>;

    /// Remove a worker. Returns true if it existed.
    fn delete_worker(&self, id: &str) -> StateResult<bool>;

    /// Every stored worker, in no particular order.
    fn scan_workers(&self) -> StateResult<Vec<Worker>>;
}
