//! Scheduler error types.

use gpugrid_state::{InvalidTransition, JobStatus, StateError};
use thiserror::Error;

/// Errors that can occur during scheduling operations.
///
/// Negative outcomes that callers are expected to poll through (no job for a
/// worker, a refused cancel) are plain return values, not errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("cannot {action} job {job_id} in status {status}")]
    InvalidTransition {
        job_id: String,
        status: JobStatus,
        action: &'static str,
    },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl SchedulerError {
    pub(crate) fn transition(job_id: &str, err: InvalidTransition) -> Self {
        SchedulerError::InvalidTransition {
            job_id: job_id.to_string(),
            status: err.from,
            action: err.action,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
