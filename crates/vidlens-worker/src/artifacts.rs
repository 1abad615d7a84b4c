//! Result artifacts on disk: `<results_dir>/<job_id>/analysis.json`.

use std::path::{Path, PathBuf};

use tracing::debug;
use vidlens_models::{AnalysisResult, JobId};

use crate::error::{WorkerError, WorkerResult};

const ARTIFACT_NAME: &str = "analysis.json";

/// Writes and removes per-job result directories.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    root: PathBuf,
}

impl ResultWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn artifact_path(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join(ARTIFACT_NAME)
    }

    /// Persist the result as pretty JSON, replacing the file atomically.
    pub async fn write(&self, id: &JobId, result: &AnalysisResult) -> WorkerResult<PathBuf> {
        let dir = self.job_dir(id);
        tokio::fs::create_dir_all(&dir).await?;

        let body = serde_json::to_vec_pretty(result)?;
        let path = dir.join(ARTIFACT_NAME);
        let tmp = dir.join(format!("{ARTIFACT_NAME}.tmp"));
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            WorkerError::artifact(format!("cannot move {} into place: {}", tmp.display(), e))
        })?;

        debug!(job_id = %id, path = %path.display(), bytes = body.len(), "Wrote result artifact");
        Ok(path)
    }

    /// Read a persisted result back.
    pub async fn read(&self, id: &JobId) -> WorkerResult<AnalysisResult> {
        let body = tokio::fs::read(self.artifact_path(id)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Remove the job's result directory. Returns whether it existed.
    pub async fn remove(&self, id: &JobId) -> WorkerResult<bool> {
        match tokio::fs::remove_dir_all(self.job_dir(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidlens_models::SceneSegment;

    #[tokio::test]
    async fn test_write_read_remove() {
        let root = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(root.path());
        let id = JobId::new();

        let result = AnalysisResult {
            scenes: vec![SceneSegment {
                index: 0,
                start_time: 0.0,
                end_time: 10.0,
                start_frame: 0,
                end_frame: 300,
            }],
            ..Default::default()
        };

        let path = writer.write(&id, &result).await.unwrap();
        assert_eq!(path, root.path().join(id.as_str()).join("analysis.json"));
        assert_eq!(writer.read(&id).await.unwrap(), result);

        assert!(writer.remove(&id).await.unwrap());
        assert!(!writer.remove(&id).await.unwrap());
    }
}
