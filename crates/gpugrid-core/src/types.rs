//! Closed enums shared across the scheduler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a job (UUID string assigned at submission).
pub type JobId = String;

/// Identifier of a GPU worker (chosen by the worker runtime).
pub type WorkerId = String;

/// Identifier of the tenant that owns a job.
pub type UserId = String;

/// Kind of GPU work a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FaceDetection,
    FaceEmbedding,
    ExpressionExtraction,
    ModelTraining,
    PreviewGeneration,
    LipsyncGeneration,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::FaceDetection,
        JobType::FaceEmbedding,
        JobType::ExpressionExtraction,
        JobType::ModelTraining,
        JobType::PreviewGeneration,
        JobType::LipsyncGeneration,
    ];

    /// Default expected runtime, used for the job's `estimated_duration_ms`.
    pub fn estimated_duration_ms(self) -> u64 {
        match self {
            JobType::FaceDetection => 2_000,
            JobType::FaceEmbedding => 3_000,
            JobType::ExpressionExtraction => 5_000,
            JobType::ModelTraining => 30 * 60 * 1_000,
            JobType::PreviewGeneration => 30_000,
            JobType::LipsyncGeneration => 60_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::FaceDetection => "face_detection",
            JobType::FaceEmbedding => "face_embedding",
            JobType::ExpressionExtraction => "expression_extraction",
            JobType::ModelTraining => "model_training",
            JobType::PreviewGeneration => "preview_generation",
            JobType::LipsyncGeneration => "lipsync_generation",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown job type: {s}"))
    }
}

/// Priority class. Declaration order is dequeue order: `Critical` first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Queue rank; lower ranks are dequeued first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    /// True if `self` belongs to the same or a more urgent class than `other`.
    pub fn is_at_least_as_urgent_as(self, other: Priority) -> bool {
        self.rank() <= other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown priority: {s}"))
    }
}

/// GPU model backing a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GpuType {
    T4,
    V100,
    A100,
}

impl GpuType {
    pub const ALL: [GpuType; 3] = [GpuType::T4, GpuType::V100, GpuType::A100];

    pub fn as_str(self) -> &'static str {
        match self {
            GpuType::T4 => "T4",
            GpuType::V100 => "V100",
            GpuType::A100 => "A100",
        }
    }
}

impl fmt::Display for GpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GpuType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GpuType::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown gpu type: {s}"))
    }
}
