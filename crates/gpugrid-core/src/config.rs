//! gpugrid.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{GpuType, Priority};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub scheduler: SchedulerSettings,
    pub autoscaling: AutoscalingSettings,
    pub costs: CostRates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Priority used when a submission doesn't name one.
    pub default_priority: Priority,
    /// Retry bound used when a submission doesn't override it.
    pub max_retries: u32,
    /// A processing job older than this is failed by the timeout sweep.
    pub job_timeout_ms: u64,
    /// Interval at which workers are expected to heartbeat.
    pub heartbeat_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            default_priority: Priority::Normal,
            max_retries: 3,
            job_timeout_ms: 30 * 60 * 1_000,
            heartbeat_interval_ms: 10_000,
        }
    }
}

impl SchedulerSettings {
    /// Heartbeat age after which a worker is presumed dead.
    pub fn stale_threshold_ms(&self) -> u64 {
        self.heartbeat_interval_ms.saturating_mul(3)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalingSettings {
    pub min_workers: u32,
    pub max_workers: u32,
    /// Pending-queue length at which a scale-up is recommended.
    pub scale_up_threshold: u32,
    /// Idle duration (ms) before a worker counts toward scale-down.
    pub scale_down_threshold_ms: u64,
    /// Minimum time between two scale actions.
    pub cooldown_period_ms: u64,
    /// Whether new capacity may come from preemptible nodes.
    pub preemptible_enabled: bool,
}

impl Default for AutoscalingSettings {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 10,
            scale_up_threshold: 10,
            scale_down_threshold_ms: 5 * 60 * 1_000,
            cooldown_period_ms: 60_000,
            preemptible_enabled: true,
        }
    }
}

/// Hourly price (USD) per GPU type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostRates {
    pub t4: f64,
    pub v100: f64,
    pub a100: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            t4: 0.35,
            v100: 2.48,
            a100: 3.67,
        }
    }
}

impl CostRates {
    pub fn hourly(&self, gpu: GpuType) -> f64 {
        match gpu {
            GpuType::T4 => self.t4,
            GpuType::V100 => self.v100,
            GpuType::A100 => self.a100,
        }
    }
}

impl GridConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scaling = &self.autoscaling;
        if scaling.min_workers > scaling.max_workers {
            return Err(ConfigError::Invalid(format!(
                "autoscaling.min_workers ({}) exceeds max_workers ({})",
                scaling.min_workers, scaling.max_workers
            )));
        }
        if self.scheduler.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        for gpu in GpuType::ALL {
            let rate = self.costs.hourly(gpu);
            if !rate.is_finite() || rate < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "costs.{} must be a non-negative number, got {rate}",
                    gpu.as_str().to_ascii_lowercase()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = GridConfig::from_toml_str("").unwrap();
        assert_eq!(config, GridConfig::default());
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.scheduler.default_priority, Priority::Normal);
    }

    #[test]
    fn parse_partial_sections() {
        let config = GridConfig::from_toml_str(
            r#"
[scheduler]
default_priority = "high"
heartbeat_interval_ms = 2000

[autoscaling]
max_workers = 4
cooldown_period_ms = 0

[costs]
a100 = 4.10
"#,
        )
        .unwrap();

        assert_eq!(config.scheduler.default_priority, Priority::High);
        assert_eq!(config.scheduler.stale_threshold_ms(), 6_000);
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.autoscaling.max_workers, 4);
        assert_eq!(config.autoscaling.cooldown_period_ms, 0);
        assert_eq!(config.autoscaling.min_workers, 1);
        assert_eq!(config.costs.hourly(GpuType::A100), 4.10);
        assert_eq!(config.costs.hourly(GpuType::T4), 0.35);
    }

    #[test]
    fn rejects_inverted_worker_bounds() {
        let err = GridConfig::from_toml_str(
            r#"
[autoscaling]
min_workers = 5
max_workers = 2
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_rate() {
        let mut config = GridConfig::default();
        config.costs.v100 = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_heartbeat_interval() {
        let mut config = GridConfig::default();
        config.scheduler.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_priority() {
        let err = GridConfig::from_toml_str("[scheduler]\ndefault_priority = \"urgent\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rendered_template_parses_back() {
        let rendered = GridConfig::default().to_toml_string().unwrap();
        assert!(rendered.contains("[autoscaling]"));
        assert!(rendered.contains("preemptible_enabled = true"));
        let parsed = GridConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, GridConfig::default());
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpugrid.toml");
        std::fs::write(&path, "[scheduler]\nmax_retries = 7\n").unwrap();

        let config = GridConfig::from_file(&path).unwrap();
        assert_eq!(config.scheduler.max_retries, 7);

        let missing = GridConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
