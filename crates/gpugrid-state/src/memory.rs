//! In-memory [`Store`] backend.

use std::collections::HashMap;
use std::sync::RwLock;

use gpugrid_core::{JobId, WorkerId};

use crate::error::{StateError, StateResult};
use crate::store::Store;
use crate::types::{Job, Worker};

/// Maps behind a lock. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    workers: RwLock<HashMap<WorkerId, Worker>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get_job(&self, id: &str) -> StateResult<Option<Job>> {
        let jobs = self.jobs.read().map_err(|_| StateError::Poisoned)?;
        Ok(jobs.get(id).cloned())
    }

    fn put_job(&self, job: &Job) -> StateResult<()> {
        let mut jobs = self.jobs.write().map_err(|_| StateError::Poisoned)?;
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn delete_job(&self, id: &str) -> StateResult<bool> {
        let mut jobs = self.jobs.write().map_err(|_| StateError::Poisoned)?;
        Ok(jobs.remove(id).is_some())
    }

    fn scan_jobs(&self) -> StateResult<Vec<Job>> {
        let jobs = self.jobs.read().map_err(|_| StateError::Poisoned)?;
        Ok(jobs.values().cloned().collect())
    }

    fn get_worker(&self, id: &str) -> StateResult<Option<Worker>> {
        let workers = self.workers.read().map_err(|_| StateError::Poisoned)?;
        Ok(workers.get(id).cloned())
    }

    fn put_worker(&self, worker: &Worker) -> StateResult<()> {
        let mut workers = self.workers.write().map_err(|_| StateError::Poisoned)?;
        workers.insert(worker.worker_id.clone(), worker.clone());
        Ok(())
    }

    fn delete_worker(&self, id: &str) -> StateResult<bool> {
        let mut workers = self.workers.write().map_err(|_| StateError::Poisoned)?;
        Ok(workers.remove(id).is_some())
    }

    fn scan_workers(&self) -> StateResult<Vec<Worker>> {
        let workers = self.workers.read().map_err(|_| StateError::Poisoned)?;
        Ok(workers.values().cloned().collect())
    }
}
