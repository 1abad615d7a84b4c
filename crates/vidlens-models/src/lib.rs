//! Shared data models for the vidlens backend.
//!
//! This crate provides Serde-serializable types for:
//! - Analysis jobs and their lifecycle state machine
//! - Stage outputs and the aggregated analysis result
//! - Derived insights (environment, people per scene)

pub mod analysis;
pub mod insights;
pub mod job;

// Re-export common types
pub use analysis::{
    AnalysisResult, FailurePolicy, ObjectEvent, ObjectTimeline, SceneSegment, StageFailure,
    StageKind, StageOutcome, StageReport, TranscriptSegment,
};
pub use insights::{Environment, SceneInsight};
pub use job::{
    Job, JobError, JobErrorKind, JobId, JobSource, JobStatus, Transition, TransitionError,
};
