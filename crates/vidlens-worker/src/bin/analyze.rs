//! Analyze a local video file and print the result as JSON.
//!
//! Usage: `vidlens-analyze <video> [abort|tolerate]`

use std::path::PathBuf;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidlens_jobs::JobRegistry;
use vidlens_media::{check_ffmpeg, check_ffprobe};
use vidlens_ml_client::TranscriptionClient;
use vidlens_models::{FailurePolicy, Job, JobId, JobSource, JobStatus};
use vidlens_worker::{PipelineOrchestrator, StageSet, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(
            EnvFilter::from_default_env()
                .add_directive("vidlens=info".parse()?)
                .add_directive("ort=warn".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(video) = args.next().map(PathBuf::from) else {
        bail!("usage: vidlens-analyze <video> [abort|tolerate]");
    };
    let policy: FailurePolicy = match args.next() {
        Some(p) => p.parse().map_err(|e| anyhow::anyhow!("{}", e))?,
        None => FailurePolicy::Tolerate,
    };
    if !video.is_file() {
        bail!("not a file: {}", video.display());
    }

    check_ffmpeg().context("ffmpeg not available")?;
    check_ffprobe().context("ffprobe not available")?;

    let config = WorkerConfig::from_env();
    let transcription = TranscriptionClient::from_env()?;
    let registry = JobRegistry::in_memory();
    let orchestrator = PipelineOrchestrator::new(
        registry.clone(),
        StageSet::standard(&config, transcription),
        config.stage_timeout,
    );

    let filename = video
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let job = Job::new(JobId::new(), JobSource::Upload, filename, video.clone()).with_policy(policy);
    let id = job.id.clone();
    registry.create(job).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    info!(job_id = %id, path = %video.display(), "Analyzing");
    let job = orchestrator.run(&id, &cancel).await?;

    match (job.status, job.result, job.error) {
        (JobStatus::Completed, Some(result), _) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        (_, _, Some(error)) => bail!("analysis failed ({}): {}", error.kind.as_str(), error.message),
        (status, _, _) => bail!("analysis ended in unexpected state {}", status),
    }
}
