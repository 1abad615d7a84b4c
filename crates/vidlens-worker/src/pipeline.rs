//! Pipeline orchestrator.
//!
//! Drives one job through its stages:
//! `queued -> processing -> {completed, failed}`.
//!
//! - `processing` is entered exactly once, right before the first stage
//! - stages run one at a time in [`StageKind::ALL`] order
//! - each stage races its timeout and the job's cancellation token; the
//!   losing stage future is dropped, which kills its child processes
//! - under [`FailurePolicy::Abort`] the first failure fails the job and
//!   discards partial output; under [`FailurePolicy::Tolerate`] failures
//!   are recorded and the job completes if any stage succeeded

use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument};
use vidlens_jobs::{JobRegistry, JobsError};
use vidlens_models::{
    AnalysisResult, Environment, FailurePolicy, Job, JobError, JobErrorKind, JobId, StageFailure,
    StageKind, StageReport,
};

use crate::artifacts::ResultWriter;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::stages::{StageOutput, StageRunner, StageSet};

/// How a single stage attempt ended.
enum StageAttempt {
    Done(StageOutput),
    Failed(JobError),
    Cancelled,
}

/// Runs jobs through the stage set and records every transition.
pub struct PipelineOrchestrator {
    registry: JobRegistry,
    stages: StageSet,
    stage_timeout: Duration,
    artifacts: Option<ResultWriter>,
}

impl PipelineOrchestrator {
    pub fn new(registry: JobRegistry, stages: StageSet, stage_timeout: Duration) -> Self {
        Self {
            registry,
            stages,
            stage_timeout,
            artifacts: None,
        }
    }

    /// Also persist completed results under `writer`'s root.
    pub fn with_artifacts(mut self, writer: ResultWriter) -> Self {
        self.artifacts = Some(writer);
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn stages(&self) -> &StageSet {
        &self.stages
    }

    pub fn artifacts(&self) -> Option<&ResultWriter> {
        self.artifacts.as_ref()
    }

    /// Reports marking every stage as not run.
    pub fn skipped_reports(&self) -> Vec<StageReport> {
        self.stages
            .kinds()
            .into_iter()
            .map(StageReport::skipped)
            .collect()
    }

    /// Run the job to a terminal state and return it.
    pub async fn run(&self, id: &JobId, cancel: &CancellationToken) -> WorkerResult<Job> {
        let logger = JobLogger::new(id, "analysis");
        let span = logger.create_span();
        self.run_inner(id, cancel, &logger).instrument(span).await
    }

    async fn run_inner(
        &self,
        id: &JobId,
        cancel: &CancellationToken,
        logger: &JobLogger,
    ) -> WorkerResult<Job> {
        if cancel.is_cancelled() {
            logger.log_warning("cancelled before start");
            return self
                .settle(id, self.registry.fail(id, JobError::cancelled(), self.skipped_reports()).await)
                .await;
        }

        let job = match self.registry.start(id).await {
            Ok(job) => job,
            Err(e) if e.is_illegal_transition() => {
                // Finished elsewhere (cancelled while queued).
                logger.log_warning(&format!("not started: {}", e));
                return Ok(self.registry.get(id).await?);
            }
            Err(e) => return Err(e.into()),
        };
        logger.log_start(&format!(
            "{} stages, policy {}",
            self.stages.len(),
            job.policy.as_str()
        ));

        let started = Instant::now();
        let mut result = AnalysisResult::default();
        let mut reports = Vec::with_capacity(self.stages.len());
        let mut succeeded = 0usize;
        let mut first_error: Option<JobError> = None;
        let mut runners = self.stages.runners().iter();

        while let Some(runner) = runners.next() {
            let stage = runner.kind();
            let stage_logger = logger.for_operation(stage.as_str());
            stage_logger.log_progress("running");

            let stage_started = Instant::now();
            let attempt = self.attempt(runner.as_ref(), &job.media_path, cancel).await;
            let elapsed_ms = stage_started.elapsed().as_millis() as u64;
            metrics::histogram!("vidlens_stage_duration_seconds", "stage" => stage.as_str())
                .record(stage_started.elapsed().as_secs_f64());

            match attempt {
                StageAttempt::Done(output) => {
                    merge(&mut result, output);
                    reports.push(StageReport::succeeded(stage, elapsed_ms));
                    succeeded += 1;
                    stage_logger.log_progress(&format!("done in {} ms", elapsed_ms));
                }
                StageAttempt::Cancelled => {
                    reports.push(StageReport::failed(stage, elapsed_ms, "cancelled"));
                    reports.extend(runners.by_ref().map(|r| StageReport::skipped(r.kind())));
                    logger.log_warning(&format!("cancelled during {}", stage));
                    let outcome = self.registry.fail(id, JobError::cancelled(), reports).await;
                    return self.settle(id, outcome).await;
                }
                StageAttempt::Failed(error) => {
                    metrics::counter!(
                        "vidlens_stage_failures_total",
                        "stage" => stage.as_str(),
                        "kind" => error.kind.as_str()
                    )
                    .increment(1);
                    stage_logger.log_error(&error.message);
                    reports.push(StageReport::failed(stage, elapsed_ms, error.message.clone()));

                    match job.policy {
                        FailurePolicy::Abort => {
                            reports.extend(runners.by_ref().map(|r| StageReport::skipped(r.kind())));
                            let outcome = self.registry.fail(id, error, reports).await;
                            return self.settle(id, outcome).await;
                        }
                        FailurePolicy::Tolerate => {
                            result.stage_errors.push(StageFailure {
                                stage,
                                kind: error.kind,
                                message: error.message.clone(),
                            });
                            first_error.get_or_insert(error);
                        }
                    }
                }
            }
        }

        if succeeded == 0 {
            if let Some(error) = first_error {
                let outcome = self.registry.fail(id, error, reports).await;
                return self.settle(id, outcome).await;
            }
        }

        aggregate(&mut result);
        self.persist(id, &result, logger).await;

        let outcome = self.registry.complete(id, result, reports).await;
        let job = self.settle(id, outcome).await?;
        logger.log_completion(&format!(
            "{} in {:.1}s",
            job.status,
            started.elapsed().as_secs_f64()
        ));
        Ok(job)
    }

    async fn attempt(
        &self,
        runner: &dyn StageRunner,
        video: &Path,
        cancel: &CancellationToken,
    ) -> StageAttempt {
        let stage = runner.kind();
        if cancel.is_cancelled() {
            return StageAttempt::Cancelled;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => StageAttempt::Cancelled,
            outcome = tokio::time::timeout(self.stage_timeout, runner.analyze(video)) => match outcome {
                Ok(Ok(output)) if output.kind() == stage => StageAttempt::Done(output),
                Ok(Ok(output)) => StageAttempt::Failed(
                    JobError::new(
                        JobErrorKind::Internal,
                        format!("{} produced {} output", stage, output.kind()),
                    )
                    .with_stage(stage),
                ),
                Ok(Err(e)) => StageAttempt::Failed(
                    JobError::new(JobErrorKind::StageFailed, e.to_string()).with_stage(stage),
                ),
                Err(_) => StageAttempt::Failed(
                    JobError::new(
                        JobErrorKind::StageTimeout,
                        format!("{} timed out after {}s", stage, self.stage_timeout.as_secs()),
                    )
                    .with_stage(stage),
                ),
            },
        }
    }

    async fn persist(&self, id: &JobId, result: &AnalysisResult, logger: &JobLogger) {
        let Some(writer) = &self.artifacts else {
            return;
        };
        if let Err(e) = writer.write(id, result).await {
            logger.log_warning(&format!("result artifact not written: {}", e));
        }
    }

    /// Turn a terminal transition into the stored job.
    ///
    /// A transition rejected because the job is already terminal (it was
    /// cancelled from outside) resolves to the stored state.
    async fn settle(&self, id: &JobId, outcome: Result<Job, JobsError>) -> WorkerResult<Job> {
        match outcome {
            Ok(job) => Ok(job),
            Err(e) if e.is_illegal_transition() => {
                warn!(job_id = %id, error = %e, "Job already finished elsewhere");
                Ok(self.registry.get(id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn merge(result: &mut AnalysisResult, output: StageOutput) {
    match output {
        StageOutput::Scenes(scenes) => result.scenes = scenes,
        StageOutput::Transcript(transcript) => result.transcript = transcript,
        StageOutput::Objects(objects) => result.objects = objects,
    }
}

/// Derive the cross-stage insights.
fn aggregate(result: &mut AnalysisResult) {
    result.environment = Environment::classify(result.objects.keys().map(String::as_str));
    result.scene_insights = vidlens_models::insights::scene_insights(&result.scenes, &result.objects);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::testing::{FailingStage, FixedStage, SlowStage};
    use vidlens_models::{JobSource, JobStatus, StageOutcome};

    async fn queued(registry: &JobRegistry, policy: FailurePolicy) -> JobId {
        let job = Job::new(JobId::new(), JobSource::Upload, "clip.mp4", "/tmp/clip.mp4")
            .with_policy(policy);
        let id = job.id.clone();
        registry.create(job).await.unwrap();
        id
    }

    fn orchestrator(registry: &JobRegistry, runners: Vec<Arc<dyn StageRunner>>) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            registry.clone(),
            StageSet::new(runners),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let registry = JobRegistry::in_memory();
        let id = queued(&registry, FailurePolicy::Abort).await;
        let orch = orchestrator(&registry, FixedStage::all());

        let job = orch.run(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.started_at.is_some() && job.finished_at.is_some());

        let result = registry.result(&id).await.unwrap();
        assert_eq!(result.scenes.len(), 2);
        assert_eq!(result.scenes[0].start_time, 0.0);
        assert_eq!(result.scenes[0].end_time, result.scenes[1].start_time);
        assert_eq!(result.scenes[0].end_frame, result.scenes[1].start_frame);
        assert_eq!(result.objects["person"].len(), 3);
        assert_eq!(result.scene_insights.len(), 2);
        assert!(!result.is_partial());
        assert_eq!(
            job.stages.iter().map(|r| r.stage).collect::<Vec<_>>(),
            StageKind::ALL.to_vec()
        );
    }

    #[tokio::test]
    async fn test_abort_discards_partial_output() {
        let registry = JobRegistry::in_memory();
        let id = queued(&registry, FailurePolicy::Abort).await;
        let orch = orchestrator(
            &registry,
            vec![
                FixedStage::scenes(),
                Arc::new(FailingStage(StageKind::Transcription)),
                FixedStage::objects(),
            ],
        );

        let job = orch.run(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let error = job.error.unwrap();
        assert_eq!(error.kind, JobErrorKind::StageFailed);
        assert_eq!(error.stage, Some(StageKind::Transcription));
        assert!(!error.message.is_empty());
        assert!(job.result.is_none());
        assert_eq!(job.stages[2].outcome, StageOutcome::Skipped);
        assert!(matches!(
            registry.result(&id).await,
            Err(JobsError::NotComplete { .. })
        ));
    }

    #[tokio::test]
    async fn test_tolerate_completes_with_stage_errors() {
        let registry = JobRegistry::in_memory();
        let id = queued(&registry, FailurePolicy::Tolerate).await;
        let orch = orchestrator(
            &registry,
            vec![
                FixedStage::scenes(),
                Arc::new(FailingStage(StageKind::Transcription)),
                FixedStage::objects(),
            ],
        );

        let job = orch.run(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let result = job.result.unwrap();
        assert!(result.is_partial());
        assert_eq!(result.stage_errors[0].stage, StageKind::Transcription);
        assert!(result.transcript.is_empty());
        assert!(!result.scenes.is_empty());
    }

    #[tokio::test]
    async fn test_tolerate_fails_when_nothing_succeeds() {
        let registry = JobRegistry::in_memory();
        let id = queued(&registry, FailurePolicy::Tolerate).await;
        let orch = orchestrator(
            &registry,
            StageKind::ALL
                .iter()
                .map(|k| Arc::new(FailingStage(*k)) as Arc<dyn StageRunner>)
                .collect(),
        );

        let job = orch.run(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().stage, Some(StageKind::SceneSegmentation));
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let registry = JobRegistry::in_memory();
        let id = queued(&registry, FailurePolicy::Abort).await;
        let orch = PipelineOrchestrator::new(
            registry.clone(),
            StageSet::new(vec![Arc::new(SlowStage::new(StageKind::SceneSegmentation))]),
            Duration::from_millis(50),
        );

        let job = orch.run(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().kind, JobErrorKind::StageTimeout);
    }

    #[tokio::test]
    async fn test_cancel_during_stage() {
        let registry = JobRegistry::in_memory();
        let id = queued(&registry, FailurePolicy::Tolerate).await;
        let slow = SlowStage::new(StageKind::Transcription);
        let entered = slow.entered();
        let orch = Arc::new(orchestrator(
            &registry,
            vec![FixedStage::scenes(), Arc::new(slow), FixedStage::objects()],
        ));

        let cancel = CancellationToken::new();
        let run = {
            let orch = orch.clone();
            let cancel = cancel.clone();
            let id = id.clone();
            tokio::spawn(async move { orch.run(&id, &cancel).await })
        };
        entered.notified().await;
        cancel.cancel();

        let job = run.await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().kind, JobErrorKind::Cancelled);
        assert_eq!(job.stages[2].outcome, StageOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let registry = JobRegistry::in_memory();
        let id = queued(&registry, FailurePolicy::Abort).await;
        let orch = orchestrator(&registry, FixedStage::all());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let job = orch.run(&id, &cancel).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.started_at.is_none());
    }

    #[tokio::test]
    async fn test_result_artifact_written() {
        let registry = JobRegistry::in_memory();
        let id = queued(&registry, FailurePolicy::Abort).await;
        let root = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(root.path());
        let orch = orchestrator(&registry, FixedStage::all()).with_artifacts(writer.clone());

        orch.run(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(
            writer.read(&id).await.unwrap(),
            registry.result(&id).await.unwrap()
        );
    }
}
