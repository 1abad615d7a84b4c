//! Analysis result types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::insights::{Environment, SceneInsight};
use crate::job::JobErrorKind;

/// One independent analysis pass over a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    SceneSegmentation,
    Transcription,
    ObjectDetection,
}

impl StageKind {
    /// Pipeline order.
    pub const ALL: [StageKind; 3] = [
        StageKind::SceneSegmentation,
        StageKind::Transcription,
        StageKind::ObjectDetection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::SceneSegmentation => "scene_segmentation",
            StageKind::Transcription => "transcription",
            StageKind::ObjectDetection => "object_detection",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A contiguous scene, 0-indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneSegment {
    pub index: u32,
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds
    pub end_time: f64,
    pub start_frame: u64,
    pub end_frame: u64,
}

impl SceneSegment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A transcribed speech segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// One detected object instance on one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectEvent {
    /// Frame timestamp in seconds
    pub timestamp: f64,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
    /// Source frame index
    pub frame: u64,
}

/// Class name to time-ordered detection events.
pub type ObjectTimeline = BTreeMap<String, Vec<ObjectEvent>>;

/// A stage failure retained under [`FailurePolicy::Tolerate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageFailure {
    pub stage: StageKind,
    pub kind: JobErrorKind,
    pub message: String,
}

/// Aggregated output of every stage for one job.
///
/// Attached to a job only on completion and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub scenes: Vec<SceneSegment>,
    pub transcript: Vec<TranscriptSegment>,
    pub objects: ObjectTimeline,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub scene_insights: Vec<SceneInsight>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_errors: Vec<StageFailure>,
}

impl AnalysisResult {
    /// Whether every stage contributed output.
    pub fn is_partial(&self) -> bool {
        !self.stage_errors.is_empty()
    }

    /// Total number of detection events across all classes.
    pub fn object_event_count(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }
}

/// How the orchestrator reacts to a failing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First stage failure fails the job; partial output is discarded.
    #[default]
    Abort,
    /// Failed stages are recorded in `stage_errors`; the job completes if
    /// at least one stage succeeded.
    Tolerate,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Abort => "abort",
            FailurePolicy::Tolerate => "tolerate",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "tolerate" => Ok(FailurePolicy::Tolerate),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// Outcome of one stage in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Failed,
    /// Not run because the job was aborted or cancelled first
    Skipped,
}

/// Per-stage execution report, in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageReport {
    pub stage: StageKind,
    pub outcome: StageOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageReport {
    pub fn succeeded(stage: StageKind, duration_ms: u64) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Succeeded,
            duration_ms,
            error: None,
        }
    }

    pub fn failed(stage: StageKind, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Failed,
            duration_ms,
            error: Some(error.into()),
        }
    }

    pub fn skipped(stage: StageKind) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            duration_ms: 0,
            error: None,
        }
    }
}
