//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second (submission routes)
    pub rate_limit_rps: u32,
    /// Max upload body size
    pub max_upload_bytes: usize,
    /// Stored media root, also served under `/uploads`
    pub upload_dir: PathBuf,
    /// In-progress uploads; kept outside `upload_dir` so partial files
    /// are never served
    pub staging_dir: PathBuf,
    /// Result artifact root
    pub results_dir: PathBuf,
    /// Environment (development/production)
    pub environment: String,
    /// Evict terminal jobs older than this
    pub retention_max_age: Option<Duration>,
    /// Keep at most this many terminal jobs
    pub retention_max_jobs: Option<usize>,
    /// How often the retention sweeper runs
    pub retention_interval: Duration,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_upload_bytes: 2 * 1024 * 1024 * 1024, // 2GB
            upload_dir: PathBuf::from("uploads"),
            staging_dir: PathBuf::from("staging"),
            results_dir: PathBuf::from("results"),
            environment: "development".to_string(),
            retention_max_age: None,
            retention_max_jobs: None,
            retention_interval: Duration::from_secs(60),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2 * 1024 * 1024 * 1024),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            staging_dir: std::env::var("UPLOAD_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("staging")),
            results_dir: std::env::var("RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("results")),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            retention_max_age: std::env::var("JOB_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs),
            retention_max_jobs: std::env::var("JOB_RETENTION_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok()),
            retention_interval: Duration::from_secs(
                std::env::var("JOB_RETENTION_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs: &u64| *secs > 0)
                    .unwrap_or(60),
            ),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    pub fn retention_enabled(&self) -> bool {
        self.retention_max_age.is_some() || self.retention_max_jobs.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_disabled_by_default() {
        let config = ApiConfig::default();
        assert!(!config.retention_enabled());
        assert!(!config.is_production());
    }

    #[test]
    fn test_staging_outside_served_root() {
        let config = ApiConfig::default();
        assert!(!config.staging_dir.starts_with(&config.upload_dir));
    }
}
