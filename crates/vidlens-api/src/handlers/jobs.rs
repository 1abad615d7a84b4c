//! Job status, result and cancellation handlers.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use vidlens_models::{
    AnalysisResult, FailurePolicy, Job, JobErrorKind, JobId, JobSource, JobStatus, StageKind,
    StageReport,
};

use crate::error::ApiResult;
use crate::state::AppState;

/// Job status response.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    /// queued, processing, completed, failed
    pub status: JobStatus,
    /// Original upload name, or the URL for remote sources
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub policy: FailurePolicy,
    /// Error message if the job failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<JobErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageKind>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-stage reports, empty until the job is terminal
    pub stages: Vec<StageReport>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let source_url = match job.source {
            JobSource::Url { url } => Some(url),
            JobSource::Upload => None,
        };
        let (error, error_kind, failed_stage) = match job.error {
            Some(e) => (Some(e.message), Some(e.kind), e.stage),
            None => (None, None, None),
        };

        Self {
            job_id: job.id,
            status: job.status,
            filename: job.source_filename,
            source_url,
            policy: job.policy,
            error,
            error_kind,
            failed_stage,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            stages: job.stages,
        }
    }
}

/// Cancel response.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Get a job's status.
///
/// GET /analyze/:job_id
///
/// Returns 404 for unknown ids.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.registry.get(&JobId::from_string(job_id)).await?;
    Ok(Json(job.into()))
}

/// Get a completed job's analysis result.
///
/// GET /results/:job_id
///
/// Returns 404 for unknown ids and 400 while the job is not completed.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<AnalysisResult>> {
    let result = state.registry.result(&JobId::from_string(job_id)).await?;
    Ok(Json(result))
}

/// Cancel a queued or running job.
///
/// POST /jobs/:job_id/cancel
///
/// A queued job fails immediately; a running job stops at its current
/// stage, so the returned status may still be `processing`.
/// Returns 404 for unknown ids and 409 when the job already finished.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let job = state.executor.cancel(&JobId::from_string(job_id)).await?;
    Ok(Json(CancelResponse {
        job_id: job.id,
        status: job.status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidlens_models::{JobError, Transition};

    #[test]
    fn test_status_response_from_failed_job() {
        let mut job = Job::new(
            JobId::new(),
            JobSource::Url {
                url: "https://example.com/v".to_string(),
            },
            "v.mp4",
            "/tmp/v.mp4",
        );
        job.apply(Transition::Start).unwrap();
        job.apply(Transition::Fail {
            error: JobError::new(JobErrorKind::StageFailed, "decoder error")
                .with_stage(StageKind::SceneSegmentation),
            stages: vec![],
        })
        .unwrap();

        let response = JobStatusResponse::from(job);
        assert_eq!(response.status, JobStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("decoder error"));
        assert_eq!(response.error_kind, Some(JobErrorKind::StageFailed));
        assert_eq!(response.failed_stage, Some(StageKind::SceneSegmentation));
        assert_eq!(response.source_url.as_deref(), Some("https://example.com/v"));
        assert!(response.finished_at.is_some());
    }
}
