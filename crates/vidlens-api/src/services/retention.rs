//! Background service evicting finished jobs.
//!
//! Disabled unless `JOB_RETENTION_SECS` or `JOB_RETENTION_MAX_JOBS` is set;
//! without it, terminal jobs stay queryable for the process lifetime.
//!
//! Each cycle:
//! - evicts terminal jobs finished longer than the max age ago
//! - then, if a cap is set, evicts the oldest terminal jobs beyond it
//!
//! Eviction removes the registry entry, the stored media file and the
//! result directory. Queued and processing jobs are never touched.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vidlens_jobs::JobRegistry;
use vidlens_media::MediaStore;
use vidlens_models::{Job, JobId};
use vidlens_worker::ResultWriter;

use crate::config::ApiConfig;
use crate::metrics;

/// Retention sweeper service.
pub struct RetentionSweeper {
    registry: JobRegistry,
    media: MediaStore,
    results: ResultWriter,
    max_age: Option<Duration>,
    max_jobs: Option<usize>,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        registry: JobRegistry,
        media: MediaStore,
        results: ResultWriter,
        config: &ApiConfig,
    ) -> Self {
        Self {
            registry,
            media,
            results,
            max_age: config.retention_max_age,
            max_jobs: config.retention_max_jobs,
            interval: config.retention_interval,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_age.is_some() || self.max_jobs.is_some()
    }

    /// Start the background loop; returns when `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        if !self.is_enabled() {
            info!("Job retention is disabled");
            return;
        }

        info!(
            max_age = ?self.max_age,
            max_jobs = ?self.max_jobs,
            "Starting retention sweeper (interval: {:?})", self.interval
        );

        let mut ticker = interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        error!("Retention sweep error: {}", e);
                    }
                }
            }
        }
    }

    /// Run a single cycle; returns the number of evicted jobs.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let victims = select_victims(self.registry.list().await?, now, self.max_age, self.max_jobs);
        if victims.is_empty() {
            return Ok(0);
        }

        let mut evicted = 0usize;
        for id in &victims {
            match self.evict(id).await {
                Ok(()) => evicted += 1,
                Err(e) => warn!(job_id = %id, "Failed to evict job: {}", e),
            }
        }

        metrics::record_jobs_evicted(evicted);
        info!("Retention sweep complete: {} of {} jobs evicted", evicted, victims.len());
        Ok(evicted)
    }

    async fn evict(&self, id: &JobId) -> anyhow::Result<()> {
        self.registry.remove(id).await?;
        let files = self.media.remove_job_media(id.as_str()).await?;
        let had_results = self.results.remove(id).await?;
        info!(job_id = %id, files, had_results, "Evicted job");
        Ok(())
    }
}

/// Pick the terminal jobs to evict.
fn select_victims(
    jobs: Vec<Job>,
    now: DateTime<Utc>,
    max_age: Option<Duration>,
    max_jobs: Option<usize>,
) -> Vec<JobId> {
    let mut terminal: Vec<Job> = jobs.into_iter().filter(Job::is_terminal).collect();
    terminal.sort_by_key(|j| j.finished_at.unwrap_or(j.created_at));

    let mut victims = Vec::new();
    if let Some(max_age) = max_age {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        terminal.retain(|job| match job.finished_for(now) {
            Some(age) if age > max_age => {
                victims.push(job.id.clone());
                false
            }
            _ => true,
        });
    }

    if let Some(max_jobs) = max_jobs {
        let excess = terminal.len().saturating_sub(max_jobs);
        victims.extend(terminal.iter().take(excess).map(|job| job.id.clone()));
    }

    victims
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidlens_jobs::JobStore;
    use vidlens_models::{AnalysisResult, JobSource, Transition};

    fn finished(minutes_ago: i64, now: DateTime<Utc>) -> Job {
        let mut job = Job::new(JobId::new(), JobSource::Upload, "a.mp4", "/tmp/a.mp4");
        job.apply(Transition::Start).unwrap();
        job.apply(Transition::Complete {
            result: AnalysisResult::default(),
            stages: vec![],
        })
        .unwrap();
        job.finished_at = Some(now - chrono::Duration::minutes(minutes_ago));
        job
    }

    #[test]
    fn test_max_age() {
        let now = Utc::now();
        let old = finished(120, now);
        let fresh = finished(5, now);
        let queued = Job::new(JobId::new(), JobSource::Upload, "b.mp4", "/tmp/b.mp4");

        let victims = select_victims(
            vec![old.clone(), fresh, queued],
            now,
            Some(Duration::from_secs(3600)),
            None,
        );
        assert_eq!(victims, vec![old.id]);
    }

    #[test]
    fn test_max_jobs_evicts_oldest() {
        let now = Utc::now();
        let jobs: Vec<Job> = (1..=4).map(|m| finished(m * 10, now)).collect();

        let victims = select_victims(jobs.clone(), now, None, Some(2));
        assert_eq!(victims, vec![jobs[3].id.clone(), jobs[2].id.clone()]);
    }

    #[test]
    fn test_running_jobs_never_selected() {
        let now = Utc::now();
        let mut running = Job::new(JobId::new(), JobSource::Upload, "a.mp4", "/tmp/a.mp4");
        running.apply(Transition::Start).unwrap();

        assert!(select_victims(vec![running], now, Some(Duration::ZERO), Some(0)).is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_files() {
        let uploads = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        let registry = JobRegistry::in_memory();
        let now = Utc::now();

        let job = finished(120, now);
        let id = job.id.clone();
        let media = uploads.path().join(format!("{}_a.mp4", id));
        tokio::fs::write(&media, b"video").await.unwrap();
        let writer = ResultWriter::new(results.path());
        writer.write(&id, &AnalysisResult::default()).await.unwrap();

        registry.store().insert(job).await.unwrap();

        let config = ApiConfig {
            retention_max_age: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let sweeper = RetentionSweeper::new(
            registry.clone(),
            MediaStore::new(uploads.path()),
            writer.clone(),
            &config,
        );

        assert_eq!(sweeper.sweep_once(now).await.unwrap(), 1);
        assert!(registry.get(&id).await.is_err());
        assert!(!media.exists());
        assert!(!writer.job_dir(&id).exists());
    }
}
