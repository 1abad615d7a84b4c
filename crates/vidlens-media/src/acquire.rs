//! Media acquisition: turn an upload or a remote URL into a local file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;

use crate::download::{validate_url, YtDlpDownloader};
use crate::error::{DownloadError, DownloadResult};
use crate::storage::MediaStore;

/// Input media for a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A client upload already written to a staging file.
    Upload { filename: String, staged: PathBuf },
    /// A remote page or file the downloader can fetch.
    RemoteUrl { url: String },
}

/// Fetches a remote URL into a local path.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, output_path: &Path) -> DownloadResult<()>;
}

#[async_trait]
impl RemoteFetcher for YtDlpDownloader {
    async fn fetch(&self, url: &Url, output_path: &Path) -> DownloadResult<()> {
        self.download(url, output_path).await
    }
}

/// A source resolved to a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub path: PathBuf,
    /// Name shown to clients
    pub display_name: String,
}

/// Resolves job sources into files under the media store.
#[derive(Clone)]
pub struct MediaAcquirer {
    store: MediaStore,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl MediaAcquirer {
    pub fn new(store: MediaStore, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self { store, fetcher }
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    /// Resolve `source` for `job_id`.
    ///
    /// On error nothing usable is left behind for the job.
    pub async fn resolve(&self, job_id: &str, source: &MediaSource) -> DownloadResult<ResolvedMedia> {
        self.store.ensure().await?;

        match source {
            MediaSource::Upload { filename, staged } => {
                let path = self.store.store_upload(job_id, staged, filename).await?;
                info!(job_id, path = %path.display(), "Stored upload");
                Ok(ResolvedMedia {
                    path,
                    display_name: filename.clone(),
                })
            }
            MediaSource::RemoteUrl { url } => {
                let url = validate_url(url)?;
                let result = self.fetch_remote(job_id, &url).await;
                if result.is_err() {
                    if let Err(e) = self.store.remove_job_media(job_id).await {
                        warn!(job_id, error = %e, "Failed to clean up partial download");
                    }
                }
                result
            }
        }
    }

    async fn fetch_remote(&self, job_id: &str, url: &Url) -> DownloadResult<ResolvedMedia> {
        let expected = self.store.download_path(job_id);
        self.fetcher.fetch(url, &expected).await?;

        // The downloader may have chosen another extension
        let path = if expected.exists() {
            expected
        } else {
            self.store
                .find_by_prefix(job_id)
                .await?
                .ok_or(DownloadError::NotFound)?
        };

        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        info!(job_id, url = %url, path = %path.display(), "Resolved remote media");
        Ok(ResolvedMedia { path, display_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a fixed file name (relative to the expected output's directory)
    /// or fails with a canned error.
    struct FakeFetcher {
        write_as: Option<String>,
        fail: Mutex<Option<DownloadError>>,
    }

    impl FakeFetcher {
        fn writing(name: Option<&str>) -> Self {
            Self {
                write_as: name.map(str::to_string),
                fail: Mutex::new(None),
            }
        }

        fn failing(err: DownloadError) -> Self {
            Self {
                write_as: None,
                fail: Mutex::new(Some(err)),
            }
        }
    }

    #[async_trait]
    impl RemoteFetcher for FakeFetcher {
        async fn fetch(&self, _url: &Url, output_path: &Path) -> DownloadResult<()> {
            let fail = self.fail.lock().unwrap().take();
            if let Some(err) = fail {
                // Leave a partial file behind like a real downloader
                tokio::fs::write(output_path.with_extension("mp4.part"), b"x").await?;
                return Err(err);
            }
            if let Some(name) = &self.write_as {
                let dir = output_path.parent().unwrap();
                let file = output_path
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .replace("video.mp4", name);
                tokio::fs::write(dir.join(file), b"video").await?;
            }
            Ok(())
        }
    }

    fn acquirer(dir: &TempDir, fetcher: FakeFetcher) -> MediaAcquirer {
        MediaAcquirer::new(MediaStore::new(dir.path().join("uploads")), Arc::new(fetcher))
    }

    fn remote(url: &str) -> MediaSource {
        MediaSource::RemoteUrl {
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_remote_expected_path() {
        let dir = TempDir::new().unwrap();
        let acq = acquirer(&dir, FakeFetcher::writing(Some("video.mp4")));

        let media = acq.resolve("job-1", &remote("https://example.com/v")).await.unwrap();
        assert_eq!(media.path.file_name().unwrap(), "job-1_video.mp4");
        assert_eq!(media.display_name, "job-1_video.mp4");
    }

    #[tokio::test]
    async fn test_remote_adopts_other_extension() {
        let dir = TempDir::new().unwrap();
        let acq = acquirer(&dir, FakeFetcher::writing(Some("video.webm")));

        let media = acq.resolve("job-1", &remote("https://example.com/v")).await.unwrap();
        assert_eq!(media.path.file_name().unwrap(), "job-1_video.webm");
    }

    #[tokio::test]
    async fn test_remote_missing_output_is_not_found() {
        let dir = TempDir::new().unwrap();
        let acq = acquirer(&dir, FakeFetcher::writing(None));

        let err = acq
            .resolve("job-1", &remote("https://example.com/v"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::NotFound));
    }

    #[tokio::test]
    async fn test_remote_rejection_cleans_partials() {
        let dir = TempDir::new().unwrap();
        let acq = acquirer(
            &dir,
            FakeFetcher::failing(DownloadError::RemoteRejected("HTTP Error 403".into())),
        );

        let err = acq
            .resolve("job-1", &remote("https://example.com/v"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::RemoteRejected(_)));
        assert!(acq.store().find_by_prefix("job-1").await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_url_never_fetches() {
        let dir = TempDir::new().unwrap();
        let acq = acquirer(&dir, FakeFetcher::failing(DownloadError::ToolUnavailable));

        let err = acq.resolve("job-1", &remote("javascript:alert(1)")).await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_upload_is_moved_into_store() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("staging.tmp");
        tokio::fs::write(&staged, b"video").await.unwrap();
        let acq = acquirer(&dir, FakeFetcher::writing(None));

        let media = acq
            .resolve(
                "job-9",
                &MediaSource::Upload {
                    filename: "holiday clip.mp4".into(),
                    staged: staged.clone(),
                },
            )
            .await
            .unwrap();

        assert_eq!(media.display_name, "holiday clip.mp4");
        assert_eq!(media.path.file_name().unwrap(), "job-9_holiday_clip.mp4");
        assert!(!staged.exists());
    }
}
