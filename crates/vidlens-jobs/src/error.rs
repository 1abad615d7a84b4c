//! Job registry error types.

use thiserror::Error;
use vidlens_models::{JobId, JobStatus, TransitionError};

pub type JobsResult<T> = Result<T, JobsError>;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Job {id} is {status}, not completed")]
    NotComplete { id: JobId, status: JobStatus },

    #[error("Job {id}: {source}")]
    Transition {
        id: JobId,
        #[source]
        source: TransitionError,
    },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Concurrent update conflict on job {0}")]
    Conflict(JobId),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JobsError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn transition(id: &JobId, source: TransitionError) -> Self {
        Self::Transition {
            id: id.clone(),
            source,
        }
    }

    /// Whether the job's current state rejected the change.
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, JobsError::Transition { .. })
    }
}
