//! Job submission handlers.

use std::path::Path as FsPath;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use validator::Validate;

use vidlens_media::MediaSource;
use vidlens_models::{FailurePolicy, JobId, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_UPLOAD_NAME: &str = "upload.mp4";

/// Response for both submission routes.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

impl SubmitResponse {
    fn queued(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
        }
    }
}

/// Request body for `POST /upload-url`.
#[derive(Debug, Deserialize, Validate)]
pub struct UploadUrlRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    /// `abort` (default) or `tolerate`
    #[serde(default)]
    pub policy: Option<String>,
}

/// A streamed upload waiting to be moved into the store.
/// The staging file is deleted when this is dropped.
struct StagedUpload {
    filename: String,
    path: TempPath,
    bytes: u64,
}

/// Submit a video by multipart upload.
///
/// POST /upload
///
/// Fields: `file` (required), `policy` (optional, `abort` | `tolerate`).
/// Returns 400 when the file field is missing.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    // Streamed outside the served media root, then moved into the store
    let staging_dir = state.config.staging_dir.clone();
    tokio::fs::create_dir_all(&staging_dir)
        .await
        .map_err(|e| ApiError::internal(format!("failed to create staging directory: {}", e)))?;

    let mut staged: Option<StagedUpload> = None;
    let mut policy: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") if staged.is_none() => {
                staged = Some(stage_field(field, &staging_dir).await?);
            }
            Some("policy") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid policy field: {}", e)))?;
                policy = Some(text);
            }
            _ => {}
        }
    }

    let upload = staged.ok_or_else(|| ApiError::bad_request("missing file field"))?;
    let policy = parse_policy(policy.as_deref())?;

    debug!(
        filename = %upload.filename,
        bytes = upload.bytes,
        "Upload staged"
    );

    let source = MediaSource::Upload {
        filename: upload.filename.clone(),
        staged: upload.path.to_path_buf(),
    };
    let job_id = state.gateway.submit(source, policy).await?;

    info!(job_id = %job_id, filename = %upload.filename, "Upload accepted");
    Ok(Json(SubmitResponse::queued(job_id)))
}

/// Submit a video by remote URL.
///
/// POST /upload-url
///
/// The video is downloaded before this returns. Returns 400 for invalid
/// or rejected URLs, 408 when the download times out and 500 when the
/// downloader is not installed.
pub async fn upload_url(
    State(state): State<AppState>,
    Json(request): Json<UploadUrlRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let policy = parse_policy(request.policy.as_deref())?;

    let source = MediaSource::RemoteUrl {
        url: request.url.trim().to_string(),
    };
    let job_id = state.gateway.submit(source, policy).await?;

    info!(job_id = %job_id, "URL submission accepted");
    Ok(Json(SubmitResponse::queued(job_id)))
}

fn parse_policy(raw: Option<&str>) -> ApiResult<FailurePolicy> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse().map_err(ApiError::Validation),
        None => Ok(FailurePolicy::default()),
    }
}

/// Stream one multipart field into a staging file.
async fn stage_field(mut field: Field<'_>, staging_dir: &FsPath) -> ApiResult<StagedUpload> {
    let filename = field
        .file_name()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_UPLOAD_NAME)
        .to_string();

    let (file, path) = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".part")
        .tempfile_in(staging_dir)
        .map_err(|e| ApiError::internal(format!("failed to create staging file: {}", e)))?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut bytes = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(format!("upload interrupted: {}", e)))?
    {
        bytes += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(format!("failed to write upload: {}", e)))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::internal(format!("failed to write upload: {}", e)))?;

    if bytes == 0 {
        return Err(ApiError::bad_request("uploaded file is empty"));
    }

    Ok(StagedUpload {
        filename,
        path,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy() {
        assert_eq!(parse_policy(None).unwrap(), FailurePolicy::Abort);
        assert_eq!(parse_policy(Some("  ")).unwrap(), FailurePolicy::Abort);
        assert_eq!(parse_policy(Some("Tolerate")).unwrap(), FailurePolicy::Tolerate);
        assert!(matches!(
            parse_policy(Some("retry")),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_url_request_validation() {
        let request = UploadUrlRequest {
            url: String::new(),
            policy: None,
        };
        assert!(request.validate().is_err());

        let request = UploadUrlRequest {
            url: "https://example.com/v.mp4".to_string(),
            policy: None,
        };
        assert!(request.validate().is_ok());
    }
}
