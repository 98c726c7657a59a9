//! gpugrid-metrics: observability derived from job and worker records.
//!
//! Everything here is a pure function over a snapshot of the records, so
//! callers can copy state out under a lock and compute without holding it.
//!
//! # Architecture
//!
//! ```text
//! accounting
//!   ├── queue_stats()          counts by status, mean wait/processing, throughput
//!   ├── resource_metrics()     worker counts, memory, utilization, $/hour
//!   ├── estimate_wait_time()   jobs ahead × mean processing / busy workers
//!   └── cost_analytics()       trailing-window cost by GPU and job type
//!
//! prometheus
//!   └── render_prometheus()    text/plain exposition
//! ```

pub mod accounting;
pub mod prometheus;

pub use accounting::{
    CostAnalytics, DEFAULT_PROCESSING_TIME_MS, QueueStats, ResourceMetrics,
    average_processing_time_ms, cost_analytics, estimate_wait_time, queue_stats,
    resource_metrics,
};
pub use prometheus::render_prometheus;
