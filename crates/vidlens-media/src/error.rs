//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Object detection failed: {0}")]
    DetectionFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Result type for media acquisition.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors raised while resolving a job's source into a local file.
///
/// These happen before a job exists and are reported to the submitter.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Download timed out after {0} seconds")]
    Timeout(u64),

    #[error("Video file not found after download")]
    NotFound,

    #[error("No video downloader available (install yt-dlp or youtube-dl)")]
    ToolUnavailable,

    #[error("Download failed: {0}")]
    RemoteRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Stable kind string for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::InvalidUrl(_) => "invalid_url",
            DownloadError::Timeout(_) => "timeout",
            DownloadError::NotFound => "not_found",
            DownloadError::ToolUnavailable => "tool_unavailable",
            DownloadError::RemoteRejected(_) => "remote_rejected",
            DownloadError::Io(_) => "io",
        }
    }
}

impl From<MediaError> for DownloadError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Io(io) => DownloadError::Io(io),
            MediaError::FileNotFound(_) => DownloadError::NotFound,
            other => DownloadError::Io(std::io::Error::other(other.to_string())),
        }
    }
}
