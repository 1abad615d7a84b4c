//! Worker error types.

use thiserror::Error;
use vidlens_models::{JobStatus, StageKind};

pub type WorkerResult<T> = Result<T, WorkerError>;
pub type StageResult<T> = Result<T, StageError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Executor is shutting down")]
    ShuttingDown,

    #[error("Job is already running: {0}")]
    AlreadyRunning(String),

    #[error("Job {id} already finished with status {status}")]
    AlreadyFinished { id: String, status: JobStatus },

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Job registry error: {0}")]
    Jobs(#[from] vidlens_jobs::JobsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }
}

/// Failure of a single stage runner.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage} failed: {message}")]
    Failed { stage: StageKind, message: String },

    #[error("Media error: {0}")]
    Media(#[from] vidlens_media::MediaError),

    #[error("Transcription error: {0}")]
    Transcription(#[from] vidlens_ml_client::MlError),

    #[error("Stage task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StageError {
    pub fn failed(stage: StageKind, message: impl Into<String>) -> Self {
        Self::Failed {
            stage,
            message: message.into(),
        }
    }
}
