//! Job registry: the single access point for job state.

use std::sync::Arc;

use tracing::{debug, info, warn};
use vidlens_models::{
    AnalysisResult, Job, JobError, JobErrorKind, JobId, JobStatus, StageReport, Transition,
};

use crate::error::{JobsError, JobsResult};
use crate::memory::InMemoryJobStore;
use crate::store::JobStore;

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Tracks every job's lifecycle.
///
/// Reads are open to anyone; transitions are issued by the pipeline that
/// owns the job (and by cancellation of jobs that have not started).
#[derive(Clone)]
pub struct JobRegistry {
    store: Arc<dyn JobStore>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Registry over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryJobStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Register a new queued job.
    pub async fn create(&self, job: Job) -> JobsResult<()> {
        debug_assert_eq!(job.status, JobStatus::Queued);
        let id = job.id.clone();
        let filename = job.source_filename.clone();
        self.store.insert(job).await?;

        metrics::counter!("vidlens_jobs_created_total").increment(1);
        info!(job_id = %id, filename = %filename, "Job queued");
        Ok(())
    }

    /// Fetch a job.
    pub async fn get(&self, id: &JobId) -> JobsResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| JobsError::NotFound(id.clone()))
    }

    /// Fetch the result of a completed job.
    pub async fn result(&self, id: &JobId) -> JobsResult<AnalysisResult> {
        let job = self.get(id).await?;
        match (job.status, job.result) {
            (JobStatus::Completed, Some(result)) => Ok(result),
            (status, _) => Err(JobsError::NotComplete {
                id: id.clone(),
                status,
            }),
        }
    }

    /// `queued -> processing`.
    pub async fn start(&self, id: &JobId) -> JobsResult<Job> {
        let job = self.store.transition(id, Transition::Start).await?;
        info!(job_id = %id, "Job processing");
        Ok(job)
    }

    /// `processing -> completed`.
    pub async fn complete(
        &self,
        id: &JobId,
        result: AnalysisResult,
        stages: Vec<StageReport>,
    ) -> JobsResult<Job> {
        let partial = result.is_partial();
        let job = self
            .store
            .transition(id, Transition::Complete { result, stages })
            .await?;

        metrics::counter!("vidlens_jobs_finished_total", "status" => "completed").increment(1);
        info!(job_id = %id, partial, "Job completed");
        Ok(job)
    }

    /// `queued | processing -> failed`.
    pub async fn fail(
        &self,
        id: &JobId,
        error: JobError,
        stages: Vec<StageReport>,
    ) -> JobsResult<Job> {
        let kind = error.kind.as_str();
        let message = error.message.clone();
        let job = self
            .store
            .transition(id, Transition::Fail { error, stages })
            .await?;

        metrics::counter!("vidlens_jobs_finished_total", "status" => "failed", "kind" => kind)
            .increment(1);
        warn!(job_id = %id, kind, error = %message, "Job failed");
        Ok(job)
    }

    /// Fail every job still `queued` or `processing`.
    ///
    /// Runs once at startup, before any pipeline is scheduled: a durable
    /// store can hold jobs whose pipeline died with the previous process.
    /// Returns how many jobs were settled.
    pub async fn fail_interrupted(&self, message: &str) -> JobsResult<usize> {
        let mut settled = 0;
        for job in self.store.list().await? {
            if job.status.is_terminal() {
                continue;
            }
            let error = JobError::new(JobErrorKind::Internal, message);
            match self.fail(&job.id, error, job.stages.clone()).await {
                Ok(_) => settled += 1,
                // Finished between the listing and the transition
                Err(e) if e.is_illegal_transition() => {}
                Err(e) => return Err(e),
            }
        }
        if settled > 0 {
            warn!(count = settled, "Settled jobs interrupted by a previous run");
        }
        Ok(settled)
    }

    /// Remove a job record.
    pub async fn remove(&self, id: &JobId) -> JobsResult<Option<Job>> {
        let removed = self.store.remove(id).await?;
        if removed.is_some() {
            debug!(job_id = %id, "Job removed from registry");
        }
        Ok(removed)
    }

    pub async fn list(&self) -> JobsResult<Vec<Job>> {
        self.store.list().await
    }

    pub async fn len(&self) -> JobsResult<usize> {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> JobsResult<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn counts(&self) -> JobsResult<StatusCounts> {
        let mut counts = StatusCounts::default();
        for job in self.store.list().await? {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    /// Check the backing store is reachable.
    pub async fn ping(&self) -> JobsResult<()> {
        self.store.ping().await
    }
}
