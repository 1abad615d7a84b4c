//! Fixed-stride frame sampling.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::VideoInfo;

/// One extracted frame on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    /// Source frame index
    pub index: u64,
    /// Seconds from the start of the video
    pub timestamp: f64,
    pub path: PathBuf,
}

/// Extracted frames; the backing directory is removed on drop.
#[derive(Debug)]
pub struct SampledFrames {
    _dir: TempDir,
    pub frames: Vec<SampledFrame>,
}

/// Source frames between two samples: `max(1, floor(fps * stride))`.
pub fn frame_interval(fps: f64, stride_secs: f64) -> u64 {
    let n = (fps * stride_secs).floor();
    if n.is_finite() && n >= 1.0 {
        n as u64
    } else {
        1
    }
}

/// Extracts one frame every `stride_secs` seconds of video.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    stride_secs: f64,
    timeout_secs: Option<u64>,
}

impl FrameSampler {
    pub fn new(stride_secs: f64) -> Self {
        Self {
            stride_secs,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Decode `path` and write every sampled frame as a JPEG.
    pub async fn sample(&self, path: &Path, info: &VideoInfo) -> MediaResult<SampledFrames> {
        let interval = frame_interval(info.fps, self.stride_secs);
        let dir = tempfile::Builder::new().prefix("vidlens-frames-").tempdir()?;
        let pattern = dir.path().join("frame_%06d.jpg");

        let cmd = FfmpegCommand::new(path, &pattern)
            .video_filter(format!("select='not(mod(n,{}))'", interval))
            .output_args(["-vsync", "vfr", "-q:v", "2"])
            .no_audio();

        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        runner.run(&cmd).await?;

        let frames = collect_frames(dir.path(), interval, info.fps)?;
        debug!(
            path = %path.display(),
            interval,
            count = frames.len(),
            "Sampled frames"
        );

        Ok(SampledFrames { _dir: dir, frames })
    }
}

/// Map `frame_000001.jpg`, `frame_000002.jpg`, ... back to source frames.
fn collect_frames(dir: &Path, interval: u64, fps: f64) -> MediaResult<Vec<SampledFrame>> {
    let mut numbered = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(seq) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("frame_"))
            .and_then(|s| s.parse::<u64>().ok())
        else {
            continue;
        };
        if seq == 0 {
            return Err(MediaError::internal("unexpected frame number 0"));
        }
        numbered.push((seq, path));
    }
    numbered.sort_by_key(|(seq, _)| *seq);

    Ok(numbered
        .into_iter()
        .map(|(seq, path)| {
            let index = (seq - 1) * interval;
            SampledFrame {
                index,
                timestamp: if fps > 0.0 { index as f64 / fps } else { 0.0 },
                path,
            }
        })
        .collect())
}
