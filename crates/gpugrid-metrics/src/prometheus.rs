//! Prometheus text exposition format.
//!
//! Renders queue and resource figures for scraping by a Prometheus server or
//! compatible agent.

use std::fmt::Write;

use crate::accounting::{QueueStats, ResourceMetrics};

fn gauge(out: &mut String, name: &str, help: &str, samples: &[(&str, String)]) {
    let _ = writeln!(out, "# HELP gpugrid_{name} {help}");
    let _ = writeln!(out, "# TYPE gpugrid_{name} gauge");
    for (labels, value) in samples {
        if labels.is_empty() {
            let _ = writeln!(out, "gpugrid_{name} {value}");
        } else {
            let _ = writeln!(out, "gpugrid_{name}{{{labels}}} {value}");
        }
    }
}

/// Render queue statistics and resource metrics as Prometheus gauges.
pub fn render_prometheus(queue: &QueueStats, resources: &ResourceMetrics) -> String {
    let mut out = String::new();

    gauge(
        &mut out,
        "jobs",
        "Jobs by lifecycle status.",
        &[
            ("status=\"queued\"", queue.pending_jobs.to_string()),
            ("status=\"processing\"", queue.processing_jobs.to_string()),
            ("status=\"completed\"", queue.completed_jobs.to_string()),
            ("status=\"failed\"", queue.failed_jobs.to_string()),
            ("status=\"cancelled\"", queue.cancelled_jobs.to_string()),
        ],
    );
    gauge(
        &mut out,
        "job_wait_ms",
        "Mean time from submission to start for completed jobs.",
        &[("", format!("{:.2}", queue.average_wait_time_ms))],
    );
    gauge(
        &mut out,
        "job_processing_ms",
        "Mean processing time of completed jobs.",
        &[("", format!("{:.2}", queue.average_processing_time_ms))],
    );
    gauge(
        &mut out,
        "throughput_per_minute",
        "Jobs completed in the last minute.",
        &[("", queue.throughput_per_minute.to_string())],
    );
    gauge(
        &mut out,
        "workers",
        "Workers by status.",
        &[
            ("status=\"idle\"", resources.idle_workers.to_string()),
            ("status=\"busy\"", resources.busy_workers.to_string()),
            ("status=\"draining\"", resources.draining_workers.to_string()),
            ("status=\"offline\"", resources.offline_workers.to_string()),
        ],
    );
    gauge(
        &mut out,
        "gpu_memory_mb",
        "GPU memory across all workers.",
        &[
            ("kind=\"total\"", resources.total_memory_mb.to_string()),
            ("kind=\"used\"", resources.used_memory_mb.to_string()),
        ],
    );
    gauge(
        &mut out,
        "gpu_utilization_percent",
        "Mean reported GPU utilization.",
        &[("", format!("{:.2}", resources.average_utilization_percent))],
    );
    gauge(
        &mut out,
        "cost_per_hour_usd",
        "Hourly cost of workers that are not offline.",
        &[("", format!("{:.4}", resources.estimated_cost_per_hour))],
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_queue() -> QueueStats {
        QueueStats {
            pending_jobs: 12,
            processing_jobs: 3,
            completed_jobs: 40,
            failed_jobs: 2,
            cancelled_jobs: 1,
            average_wait_time_ms: 812.5,
            average_processing_time_ms: 2_400.0,
            throughput_per_minute: 9,
        }
    }

    fn test_resources() -> ResourceMetrics {
        ResourceMetrics {
            total_workers: 4,
            idle_workers: 0,
            busy_workers: 3,
            draining_workers: 0,
            offline_workers: 1,
            total_memory_mb: 65_536,
            used_memory_mb: 30_000,
            average_utilization_percent: 71.25,
            estimated_cost_per_hour: 7.34,
        }
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&QueueStats::default(), &ResourceMetrics::default());
        assert!(output.contains("# HELP gpugrid_jobs"));
        assert!(output.contains("# TYPE gpugrid_jobs gauge"));
        assert!(output.contains("gpugrid_throughput_per_minute 0"));
    }

    #[test]
    fn render_values() {
        let output = render_prometheus(&test_queue(), &test_resources());
        assert!(output.contains("gpugrid_jobs{status=\"queued\"} 12"));
        assert!(output.contains("gpugrid_jobs{status=\"failed\"} 2"));
        assert!(output.contains("gpugrid_job_wait_ms 812.50"));
        assert!(output.contains("gpugrid_workers{status=\"busy\"} 3"));
        assert!(output.contains("gpugrid_gpu_memory_mb{kind=\"used\"} 30000"));
        assert!(output.contains("gpugrid_gpu_utilization_percent 71.25"));
        assert!(output.contains("gpugrid_cost_per_hour_usd 7.3400"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus(&test_queue(), &test_resources());
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.rsplitn(2, ' ');
            let value = parts.next().unwrap();
            let name = parts.next().unwrap();
            assert!(name.starts_with("gpugrid_"), "bad metric name: {line}");
            assert!(value.parse::<f64>().is_ok(), "bad value: {line}");
        }
    }
}
