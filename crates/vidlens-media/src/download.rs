//! Remote video download using yt-dlp (or youtube-dl).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;
use vidlens_models::job::truncate_chars;

use crate::error::{DownloadError, DownloadResult};

/// Hard wall-clock limit for one download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Prefer a single-file mp4 so stages see one container format.
pub const DEFAULT_FORMAT: &str = "best[ext=mp4]/best";

/// Downloader binaries tried in order when none is configured.
const DOWNLOADER_CANDIDATES: &[&str] = &["yt-dlp", "youtube-dl"];

/// Longest downloader diagnostic surfaced to callers, in characters.
const MAX_STDERR_CHARS: usize = 200;

/// Downloader configuration.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Explicit downloader binary (path or name on PATH)
    pub binary: Option<PathBuf>,
    pub timeout: Duration,
    pub format: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            binary: None,
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

impl DownloaderConfig {
    /// Load from `DOWNLOADER_PATH` and `DOWNLOAD_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self {
            binary: std::env::var("DOWNLOADER_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            timeout: Duration::from_secs(
                std::env::var("DOWNLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT.as_secs()),
            ),
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> DownloadResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(DownloadError::InvalidUrl(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(DownloadError::InvalidUrl("missing host".to_string()));
    }

    Ok(url)
}

/// Locate a downloader binary.
pub fn resolve_downloader(explicit: Option<&Path>) -> DownloadResult<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return which::which(path).map_err(|_| DownloadError::ToolUnavailable);
    }

    DOWNLOADER_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or(DownloadError::ToolUnavailable)
}

/// The diagnostic line to surface from downloader stderr.
fn rejection_message(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR"))
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("Unknown error");

    truncate_chars(line, MAX_STDERR_CHARS)
}

/// yt-dlp compatible downloader.
#[derive(Debug, Clone, Default)]
pub struct YtDlpDownloader {
    config: DownloaderConfig,
}

impl YtDlpDownloader {
    pub fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Whether a downloader binary can be found.
    pub fn is_available(&self) -> bool {
        resolve_downloader(self.config.binary.as_deref()).is_ok()
    }

    fn build_args(&self, url: &Url, output_path: &Path) -> Vec<String> {
        vec![
            "-f".to_string(),
            self.config.format.clone(),
            "-o".to_string(),
            output_path.to_string_lossy().to_string(),
            "--no-playlist".to_string(),
            url.to_string(),
        ]
    }

    /// Download `url` to `output_path`.
    ///
    /// The downloader may pick a different extension; callers should not
    /// assume `output_path` exists afterwards.
    pub async fn download(&self, url: &Url, output_path: &Path) -> DownloadResult<()> {
        let binary = resolve_downloader(self.config.binary.as_deref())?;
        let args = self.build_args(url, output_path);
        let timeout_secs = self.config.timeout.as_secs();

        info!(url = %url, output = %output_path.display(), "Downloading video");
        debug!("Running {} {}", binary.display(), args.join(" "));

        let started = Instant::now();
        let child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.config.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DownloadError::ToolUnavailable);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                // Dropping the output future kills the child
                warn!(url = %url, timeout_secs, "Download timed out");
                metrics::counter!("vidlens_downloads_total", "result" => "timeout").increment(1);
                return Err(DownloadError::Timeout(timeout_secs));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("downloader stderr: {}", stderr);
            metrics::counter!("vidlens_downloads_total", "result" => "rejected").increment(1);
            return Err(DownloadError::RemoteRejected(rejection_message(&stderr)));
        }

        let elapsed = started.elapsed();
        metrics::counter!("vidlens_downloads_total", "result" => "ok").increment(1);
        metrics::histogram!("vidlens_download_duration_seconds").record(elapsed.as_secs_f64());
        info!(
            url = %url,
            elapsed_ms = elapsed.as_millis() as u64,
            "Downloader finished"
        );

        Ok(())
    }
}
