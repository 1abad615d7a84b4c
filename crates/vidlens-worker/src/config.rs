//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vidlens_media::{ObjectDetectorConfig, SceneDetectorConfig};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent pipelines
    pub max_concurrent_jobs: usize,
    /// Wall-clock limit for a single stage
    pub stage_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Root directory for `<job_id>/analysis.json` artifacts
    pub results_dir: PathBuf,
    /// Seconds of video between sampled detection frames
    pub detection_stride_secs: f64,
    pub detector: ObjectDetectorConfig,
    pub scenes: SceneDetectorConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            stage_timeout: Duration::from_secs(1800), // 30 minutes
            shutdown_timeout: Duration::from_secs(30),
            results_dir: PathBuf::from("results"),
            detection_stride_secs: 1.0,
            detector: ObjectDetectorConfig::default(),
            scenes: SceneDetectorConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let detector = ObjectDetectorConfig {
            model_path: std::env::var("DETECTION_MODEL_PATH")
                .unwrap_or(defaults.detector.model_path),
            confidence_threshold: std::env::var("DETECTION_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.detector.confidence_threshold),
            ..defaults.detector
        };

        let scenes = SceneDetectorConfig {
            threshold: std::env::var("SCENE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.scenes.threshold),
            min_scene_frames: std::env::var("SCENE_MIN_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.scenes.min_scene_frames),
            ..defaults.scenes
        };

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            stage_timeout: Duration::from_secs(
                std::env::var("WORKER_STAGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            results_dir: std::env::var("RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.results_dir),
            detection_stride_secs: std::env::var("DETECTION_STRIDE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|s: &f64| *s > 0.0)
                .unwrap_or(defaults.detection_stride_secs),
            detector,
            scenes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.stage_timeout, Duration::from_secs(1800));
        assert_eq!(config.detection_stride_secs, 1.0);
        assert_eq!(config.detector.confidence_threshold, 0.25);
        assert_eq!(config.scenes.min_scene_frames, 15);
    }
}
