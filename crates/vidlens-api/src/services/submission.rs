//! Submission gateway: acquire media, register the job, schedule it.
//!
//! The job id is allocated before acquisition so stored media is named by
//! it, but the job itself only exists once its media is on disk. Rejected
//! sources leave the registry untouched.

use std::time::Instant;

use tracing::{debug, error, info, warn};
use vidlens_jobs::JobRegistry;
use vidlens_media::{MediaAcquirer, MediaSource};
use vidlens_models::{FailurePolicy, Job, JobError, JobErrorKind, JobId, JobSource};
use vidlens_worker::PipelineExecutor;

use crate::error::{ApiError, ApiResult};
use crate::metrics;

#[derive(Clone)]
pub struct SubmissionGateway {
    registry: JobRegistry,
    executor: PipelineExecutor,
    acquirer: MediaAcquirer,
}

impl SubmissionGateway {
    pub fn new(registry: JobRegistry, executor: PipelineExecutor, acquirer: MediaAcquirer) -> Self {
        Self {
            registry,
            executor,
            acquirer,
        }
    }

    pub fn acquirer(&self) -> &MediaAcquirer {
        &self.acquirer
    }

    /// Submit a new job and return its id. Returns once the job is queued.
    pub async fn submit(&self, source: MediaSource, policy: FailurePolicy) -> ApiResult<JobId> {
        if !self.executor.is_accepting() {
            return Err(ApiError::ServiceUnavailable(
                "server is shutting down".to_string(),
            ));
        }

        let id = JobId::new();
        let kind = source_kind(&source);

        let started = Instant::now();
        let resolved = match self.acquirer.resolve(id.as_str(), &source).await {
            Ok(resolved) => {
                metrics::record_acquire_duration(kind, started.elapsed().as_secs_f64());
                resolved
            }
            Err(e) => {
                warn!(job_id = %id, source = kind, error = %e, "Submission rejected");
                metrics::record_submission_rejected(kind, e.kind());
                return Err(e.into());
            }
        };

        let job_source = match source {
            MediaSource::Upload { .. } => JobSource::Upload,
            MediaSource::RemoteUrl { url } => JobSource::Url { url },
        };
        let job = Job::new(id.clone(), job_source, resolved.display_name, resolved.path)
            .with_policy(policy);
        if let Err(e) = self.registry.create(job).await {
            error!(job_id = %id, error = %e, "Failed to register job");
            self.discard_media(&id).await;
            return Err(e.into());
        }

        if let Err(e) = self.executor.submit(id.clone()) {
            // Never leave a queued job that nothing will run.
            let error = JobError::new(JobErrorKind::Internal, e.to_string());
            if let Err(fail_err) = self.registry.fail(&id, error, Vec::new()).await {
                warn!(job_id = %id, error = %fail_err, "Failed to settle unscheduled job");
            }
            return Err(e.into());
        }

        metrics::record_job_submitted(kind);
        info!(job_id = %id, source = kind, policy = policy.as_str(), "Job submitted");
        Ok(id)
    }

    /// Remove media acquired for a job that was never registered.
    async fn discard_media(&self, id: &JobId) {
        match self.acquirer.store().remove_job_media(id.as_str()).await {
            Ok(removed) => debug!(job_id = %id, removed, "Discarded unregistered media"),
            Err(e) => warn!(job_id = %id, error = %e, "Failed to discard unregistered media"),
        }
    }
}

fn source_kind(source: &MediaSource) -> &'static str {
    match source {
        MediaSource::Upload { .. } => "upload",
        MediaSource::RemoteUrl { .. } => "url",
    }
}
