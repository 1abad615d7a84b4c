//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vidlens_jobs::JobsError;
use vidlens_media::{DownloadError, MediaError};
use vidlens_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Jobs(#[from] JobsError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) | ApiError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Download(e) => match e {
                DownloadError::InvalidUrl(_)
                | DownloadError::RemoteRejected(_)
                | DownloadError::NotFound => StatusCode::BAD_REQUEST,
                DownloadError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
                DownloadError::ToolUnavailable | DownloadError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Jobs(e) => jobs_status(e),
            ApiError::Worker(e) => match e {
                WorkerError::AlreadyFinished { .. } => StatusCode::CONFLICT,
                WorkerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                WorkerError::Jobs(inner) => jobs_status(inner),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

fn jobs_status(e: &JobsError) -> StatusCode {
    match e {
        JobsError::NotFound(_) => StatusCode::NOT_FOUND,
        JobsError::NotComplete { .. } => StatusCode::BAD_REQUEST,
        JobsError::Transition { .. } | JobsError::AlreadyExists(_) | JobsError::Conflict(_) => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if status.is_server_error()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            match &self {
                ApiError::ServiceUnavailable(_) | ApiError::Download(_) => self.to_string(),
                _ => "An internal error occurred".to_string(),
            }
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidlens_models::{JobId, JobStatus};

    #[test]
    fn test_download_error_mapping() {
        let cases = [
            (DownloadError::InvalidUrl("ftp://x".into()), StatusCode::BAD_REQUEST),
            (
                DownloadError::RemoteRejected("ERROR: HTTP Error 403: Forbidden".into()),
                StatusCode::BAD_REQUEST,
            ),
            (DownloadError::NotFound, StatusCode::BAD_REQUEST),
            (DownloadError::Timeout(300), StatusCode::REQUEST_TIMEOUT),
            (DownloadError::ToolUnavailable, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_jobs_error_mapping() {
        let id = JobId::new();
        assert_eq!(
            ApiError::from(JobsError::NotFound(id.clone())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(JobsError::NotComplete {
                id: id.clone(),
                status: JobStatus::Processing
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(WorkerError::AlreadyFinished {
                id: id.to_string(),
                status: JobStatus::Completed
            })
            .status_code(),
            StatusCode::CONFLICT
        );
    }
}
