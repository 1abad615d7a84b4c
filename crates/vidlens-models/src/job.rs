//! Analysis job definitions and lifecycle.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{AnalysisResult, FailurePolicy, StageKind, StageReport};

/// Maximum length of a job error message, in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the string has the shape of an issued id.
    pub fn is_well_formed(s: &str) -> bool {
        Uuid::parse_str(s).is_ok()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
///
/// `queued -> processing -> {completed, failed}`. A queued job may also go
/// straight to `failed` when it is cancelled before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a pipeline slot
    #[default]
    Queued,
    /// Stages are running
    Processing,
    /// Result attached
    Completed,
    /// Error attached
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the job's media came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobSource {
    Upload,
    Url { url: String },
}

/// Kind of pipeline-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// A stage runner returned an error
    StageFailed,
    /// A stage exceeded its time budget
    StageTimeout,
    /// The job was cancelled
    Cancelled,
    /// The pipeline task itself failed (panic, shutdown)
    Internal,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::StageFailed => "stage_failed",
            JobErrorKind::StageTimeout => "stage_timeout",
            JobErrorKind::Cancelled => "cancelled",
            JobErrorKind::Internal => "internal",
        }
    }
}

/// Terminal error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub kind: JobErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
    pub message: String,
}

impl JobError {
    /// Create an error; the message is truncated to
    /// [`MAX_ERROR_MESSAGE_CHARS`].
    pub fn new(kind: JobErrorKind, message: impl AsRef<str>) -> Self {
        let mut message = truncate_chars(message.as_ref(), MAX_ERROR_MESSAGE_CHARS);
        if message.trim().is_empty() {
            message = kind.as_str().to_string();
        }
        Self {
            kind,
            stage: None,
            message,
        }
    }

    pub fn with_stage(mut self, stage: StageKind) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn cancelled() -> Self {
        Self::new(JobErrorKind::Cancelled, "Job cancelled")
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} in {}: {}", self.kind.as_str(), stage, self.message),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// A state change requested by the orchestrator.
#[derive(Debug, Clone)]
pub enum Transition {
    /// Enter `processing`
    Start,
    /// Enter `completed` with the aggregated result
    Complete {
        result: AnalysisResult,
        stages: Vec<StageReport>,
    },
    /// Enter `failed`
    Fail {
        error: JobError,
        stages: Vec<StageReport>,
    },
}

impl Transition {
    /// Status the job ends up in.
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Start => JobStatus::Processing,
            Transition::Complete { .. } => JobStatus::Completed,
            Transition::Fail { .. } => JobStatus::Failed,
        }
    }
}

/// Rejected state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One submitted video's analysis request and lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,

    pub status: JobStatus,

    /// Display name of the input media
    pub source_filename: String,

    pub source: JobSource,

    /// Resolved local media file
    pub media_path: PathBuf,

    #[serde(default)]
    pub policy: FailurePolicy,

    /// Present only when completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,

    /// Present only when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Per-stage reports, recorded on reaching a terminal state
    #[serde(default)]
    pub stages: Vec<StageReport>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job for already-resolved media.
    pub fn new(
        id: JobId,
        source: JobSource,
        source_filename: impl Into<String>,
        media_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            source_filename: source_filename.into(),
            source,
            media_path: media_path.into(),
            policy: FailurePolicy::default(),
            result: None,
            error: None,
            stages: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a transition. Status and payload change together or not at all.
    pub fn apply(&mut self, transition: Transition) -> Result<(), TransitionError> {
        let to = transition.target();
        let allowed = match (&self.status, &transition) {
            (JobStatus::Queued, Transition::Start) => true,
            (JobStatus::Processing, Transition::Complete { .. }) => true,
            (JobStatus::Queued | JobStatus::Processing, Transition::Fail { .. }) => true,
            _ => false,
        };
        if !allowed {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }

        let now = Utc::now();
        match transition {
            Transition::Start => {
                self.started_at = Some(now);
            }
            Transition::Complete { result, stages } => {
                self.result = Some(result);
                self.stages = stages;
                self.finished_at = Some(now);
            }
            Transition::Fail { error, stages } => {
                self.error = Some(error);
                self.stages = stages;
                self.finished_at = Some(now);
            }
        }
        self.status = to;
        Ok(())
    }

    /// Time since the job reached a terminal state.
    pub fn finished_for(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.finished_at.map(|at| now - at)
    }
}
