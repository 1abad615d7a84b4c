//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use vidlens_jobs::{JobRegistry, StoreConfig};
use vidlens_media::{DownloaderConfig, MediaAcquirer, MediaStore, YtDlpDownloader};
use vidlens_ml_client::TranscriptionClient;
use vidlens_worker::{PipelineExecutor, PipelineOrchestrator, ResultWriter, StageSet, WorkerConfig};

use crate::config::ApiConfig;
use crate::services::SubmissionGateway;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: JobRegistry,
    pub executor: PipelineExecutor,
    pub gateway: SubmissionGateway,
    pub results: ResultWriter,
    pub media: MediaStore,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store = StoreConfig::from_env()
            .build()
            .await
            .context("failed to open job store")?;
        let registry = JobRegistry::new(store);
        registry
            .fail_interrupted("interrupted by restart")
            .await
            .context("failed to settle interrupted jobs")?;

        let mut worker_config = WorkerConfig::from_env();
        worker_config.results_dir = config.results_dir.clone();

        let transcription =
            TranscriptionClient::from_env().context("failed to create transcription client")?;
        let stages = StageSet::standard(&worker_config, transcription);
        info!(stages = ?stages.kinds(), "Analysis stages configured");

        let results = ResultWriter::new(&config.results_dir);
        let orchestrator =
            PipelineOrchestrator::new(registry.clone(), stages, worker_config.stage_timeout)
                .with_artifacts(results.clone());
        let executor = PipelineExecutor::new(orchestrator, &worker_config);

        let media = MediaStore::new(&config.upload_dir);
        media.ensure().await.context("failed to create upload directory")?;
        tokio::fs::create_dir_all(&config.results_dir)
            .await
            .context("failed to create results directory")?;
        tokio::fs::create_dir_all(&config.staging_dir)
            .await
            .context("failed to create upload staging directory")?;

        let downloader = YtDlpDownloader::new(DownloaderConfig::from_env());
        if !downloader.is_available() {
            tracing::warn!("yt-dlp not found; URL submissions will fail");
        }
        let acquirer = MediaAcquirer::new(media.clone(), Arc::new(downloader));

        Ok(Self::from_parts(config, registry, executor, acquirer, results))
    }

    /// Assemble state from already-built components.
    pub fn from_parts(
        config: ApiConfig,
        registry: JobRegistry,
        executor: PipelineExecutor,
        acquirer: MediaAcquirer,
        results: ResultWriter,
    ) -> Self {
        let media = acquirer.store().clone();
        let gateway = SubmissionGateway::new(registry.clone(), executor.clone(), acquirer);
        Self {
            config,
            registry,
            executor,
            gateway,
            results,
            media,
        }
    }
}
