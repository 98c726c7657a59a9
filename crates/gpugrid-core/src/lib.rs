//! gpugrid-core: shared vocabulary for the GPU job scheduler.
//!
//! Holds the closed enums every other crate agrees on (job type, priority,
//! GPU type), the injectable millisecond clock, and the TOML configuration
//! surface loaded by the daemon.

pub mod clock;
pub mod config;
pub mod types;

pub use clock::{Clock, ManualClock, epoch_ms, system_clock};
pub use config::{AutoscalingSettings, ConfigError, CostRates, GridConfig, SchedulerSettings};
pub use types::*;
