#![deny(unreachable_patterns)]
//! Media tooling for video analysis.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with timeouts
//! - FFprobe metadata
//! - Media storage and acquisition (uploads, yt-dlp downloads)
//! - Scene segmentation, frame sampling and audio extraction
//! - YOLOv8 object detection over ONNX Runtime

pub mod acquire;
pub mod audio;
pub mod command;
pub mod detection;
pub mod download;
pub mod error;
pub mod frames;
pub mod probe;
pub mod scenes;
pub mod storage;

pub use acquire::{MediaAcquirer, MediaSource, RemoteFetcher, ResolvedMedia};
pub use audio::extract_speech_audio;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use detection::{
    Detection, FrameDetector, ObjectDetectorConfig, YoloDetector, COCO_CLASSES,
};
pub use download::{validate_url, DownloaderConfig, YtDlpDownloader};
pub use error::{DownloadError, DownloadResult, MediaError, MediaResult};
pub use frames::{frame_interval, FrameSampler, SampledFrame, SampledFrames};
pub use probe::{probe_video, VideoInfo};
pub use scenes::{SceneDetector, SceneDetectorConfig};
pub use storage::MediaStore;
