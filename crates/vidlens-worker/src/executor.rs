//! Bounded, supervised pipeline executor.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use vidlens_jobs::JobRegistry;
use vidlens_models::{Job, JobError, JobErrorKind, JobId, JobStatus};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::PipelineOrchestrator;

/// Runs pipelines in the background, at most `max_concurrent_jobs` at once.
///
/// Jobs waiting for a slot stay `queued`. Each pipeline runs in its own task
/// under a supervisor; a panic fails that job with kind `internal` and
/// leaves every other job alone.
#[derive(Clone)]
pub struct PipelineExecutor {
    orchestrator: Arc<PipelineOrchestrator>,
    job_semaphore: Arc<Semaphore>,
    active: Arc<DashMap<JobId, CancellationToken>>,
    tracker: TaskTracker,
    max_concurrent_jobs: usize,
    shutdown_timeout: Duration,
}

impl PipelineExecutor {
    pub fn new(orchestrator: PipelineOrchestrator, config: &WorkerConfig) -> Self {
        let max_concurrent_jobs = config.max_concurrent_jobs.max(1);
        info!(max_concurrent_jobs, "Pipeline executor ready");

        Self {
            orchestrator: Arc::new(orchestrator),
            job_semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            active: Arc::new(DashMap::new()),
            tracker: TaskTracker::new(),
            max_concurrent_jobs,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        self.orchestrator.registry()
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Jobs submitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.active.len()
    }

    pub fn is_accepting(&self) -> bool {
        !self.tracker.is_closed()
    }

    /// Schedule a queued job. Returns immediately.
    pub fn submit(&self, id: JobId) -> WorkerResult<()> {
        if self.tracker.is_closed() {
            return Err(WorkerError::ShuttingDown);
        }

        let token = CancellationToken::new();
        match self.active.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(WorkerError::AlreadyRunning(id.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }
        metrics::gauge!("vidlens_jobs_in_flight").set(self.active.len() as f64);

        let this = self.clone();
        self.tracker.spawn(async move {
            this.supervise(id.clone(), token).await;
            this.active.remove(&id);
            metrics::gauge!("vidlens_jobs_in_flight").set(this.active.len() as f64);
        });
        Ok(())
    }

    async fn supervise(&self, id: JobId, token: CancellationToken) {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = self.job_semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            debug!(job_id = %id, "Job cancelled while waiting for a slot");
            self.fail_quietly(&id, JobError::cancelled()).await;
            return;
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            orchestrator.run(&task_id, &token).await
        });

        match handle.await {
            Ok(Ok(job)) => debug!(job_id = %id, status = %job.status, "Pipeline finished"),
            Ok(Err(e)) => {
                error!(job_id = %id, error = %e, "Pipeline could not record its outcome");
                self.fail_quietly(&id, JobError::new(JobErrorKind::Internal, e.to_string()))
                    .await;
            }
            Err(join) if join.is_panic() => {
                let message = panic_message(join.into_panic());
                error!(job_id = %id, panic = %message, "Pipeline panicked");
                metrics::counter!("vidlens_pipeline_panics_total").increment(1);
                self.fail_quietly(
                    &id,
                    JobError::new(JobErrorKind::Internal, format!("pipeline panicked: {}", message)),
                )
                .await;
            }
            Err(join) => {
                warn!(job_id = %id, error = %join, "Pipeline task aborted");
                self.fail_quietly(&id, JobError::new(JobErrorKind::Internal, "pipeline aborted"))
                    .await;
            }
        }
    }

    /// Fail a job unless it already finished.
    async fn fail_quietly(&self, id: &JobId, error: JobError) {
        let reports = self.orchestrator.skipped_reports();
        match self.registry().fail(id, error, reports).await {
            Ok(_) => {}
            Err(e) if e.is_illegal_transition() => {
                debug!(job_id = %id, "Job already terminal");
            }
            Err(e) => error!(job_id = %id, error = %e, "Failed to record job failure"),
        }
    }

    /// Request cancellation.
    ///
    /// A queued job fails immediately with kind `cancelled`; a running job
    /// stops at its current stage. Finished jobs are rejected.
    pub async fn cancel(&self, id: &JobId) -> WorkerResult<Job> {
        let job = self.registry().get(id).await?;
        if job.is_terminal() {
            return Err(WorkerError::AlreadyFinished {
                id: id.to_string(),
                status: job.status,
            });
        }

        if let Some(token) = self.active.get(id) {
            token.cancel();
        }

        if job.status == JobStatus::Queued {
            match self
                .registry()
                .fail(id, JobError::cancelled(), self.orchestrator.skipped_reports())
                .await
            {
                Ok(job) => {
                    info!(job_id = %id, "Queued job cancelled");
                    return Ok(job);
                }
                Err(e) if e.is_illegal_transition() => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(job_id = %id, "Cancellation requested");
        Ok(self.registry().get(id).await?)
    }

    /// Wait for every submitted job to finish.
    pub async fn wait_for_jobs(&self) {
        loop {
            if self.active.is_empty()
                && self.job_semaphore.available_permits() == self.max_concurrent_jobs
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Stop accepting work and wait for in-flight pipelines, up to the
    /// shutdown timeout. Nothing is cancelled.
    pub async fn shutdown(&self) {
        self.tracker.close();
        info!(in_flight = self.in_flight(), "Waiting for in-flight jobs to complete...");

        if tokio::time::timeout(self.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.in_flight(),
                "Shutdown timeout reached with jobs still running"
            );
        } else {
            info!("Pipeline executor stopped");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
