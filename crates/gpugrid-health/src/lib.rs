//! gpugrid-health: periodic maintenance for the scheduler.
//!
//! Nothing inside the scheduler blocks on time. These drivers call its sweep
//! and autoscale operations on a timer until a shutdown signal arrives.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor (every sweep interval)
//!   ├── sweep_offline_workers(3 × heartbeat interval)
//!   │     stale workers → offline, their jobs → head of class
//!   └── sweep_timed_out_jobs()
//!         processing longer than job_timeout_ms → fail()
//!
//! AutoscaleDriver (every autoscale interval)
//!   └── check_auto_scaling() → scale callback
//! ```

pub mod autoscale;
pub mod monitor;

pub use autoscale::AutoscaleDriver;
pub use monitor::{HealthMonitor, SweepReport};
