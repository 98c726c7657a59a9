//! gpugrid-scheduler: GPU job scheduling over a shared worker pool.
//!
//! Jobs are submitted with a priority, queued, and pulled by idle workers.
//! The scheduler:
//!
//! - Orders the queue by priority class, FIFO within a class
//! - Hands each job to exactly one worker, atomically
//! - Retries failed jobs up to their retry bound
//! - Reclaims jobs from workers that stop heartbeating
//! - Fails jobs that outlive the job timeout
//! - Triggers autoscale checks and exposes queue/resource/cost metrics
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── Store (Job and Worker records)
//!   └── Mutex<Inner>
//!       ├── PriorityQueue   BTreeMap<(rank, sequence), JobId>
//!       ├── Autoscaler      cooldown-gated scale decisions
//!       └── next_sequence   submission order
//! ```

pub mod error;
pub mod queue;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use queue::PriorityQueue;
pub use scheduler::{Scheduler, SubmitOptions, WorkerHeartbeat};
