//! Content-change scene segmentation via FFmpeg's scene score.
//!
//! FFmpeg's `select='gt(scene,T)'` keeps frames whose content differs from
//! the previous frame by more than `T`; `showinfo` prints their `pts_time`.
//! Those cut times are turned into contiguous segments spanning the whole
//! timeline.

use std::path::Path;

use tracing::{debug, info};
use vidlens_models::SceneSegment;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{probe_video, seconds_to_frame, VideoInfo};

/// Scene detection settings.
#[derive(Debug, Clone)]
pub struct SceneDetectorConfig {
    /// Scene score threshold (0.0-1.0); higher means fewer cuts
    pub threshold: f64,
    /// Minimum scene length in frames (debounce)
    pub min_scene_frames: u64,
    /// FFmpeg timeout
    pub timeout_secs: Option<u64>,
}

impl Default for SceneDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_scene_frames: 15,
            timeout_secs: None,
        }
    }
}

/// Segments a video into scenes.
#[derive(Debug, Clone, Default)]
pub struct SceneDetector {
    config: SceneDetectorConfig,
}

impl SceneDetector {
    pub fn new(config: SceneDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SceneDetectorConfig {
        &self.config
    }

    /// Detect scenes in the video at `path`.
    pub async fn detect(&self, path: &Path) -> MediaResult<Vec<SceneSegment>> {
        let info = probe_video(path).await?;
        let cuts = self.detect_cuts(path).await?;
        let segments = build_segments(&cuts, &info, self.config.min_scene_frames);

        info!(
            path = %path.display(),
            cuts = cuts.len(),
            scenes = segments.len(),
            duration = info.duration,
            "Scene detection complete"
        );
        Ok(segments)
    }

    async fn detect_cuts(&self, path: &Path) -> MediaResult<Vec<f64>> {
        let filter = format!("select='gt(scene,{:.3})',showinfo", self.config.threshold);
        let cmd = FfmpegCommand::analyze(path)
            .video_filter(filter)
            .no_audio()
            .log_level("info");

        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.config.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        let lines = runner
            .run_collecting(&cmd, |line| line.contains("showinfo") && line.contains("pts_time:"))
            .await?;

        let cuts: Vec<f64> = lines.iter().filter_map(|l| parse_pts_time(l)).collect();
        debug!(count = cuts.len(), "Raw scene cuts");
        Ok(cuts)
    }
}

/// Extract `pts_time:<secs>` from a showinfo line.
fn parse_pts_time(line: &str) -> Option<f64> {
    let rest = line.split("pts_time:").nth(1)?;
    let value = rest.split_whitespace().next()?;
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Build contiguous, 0-indexed segments covering `[0, duration]`.
///
/// Cuts outside `(0, duration)` are ignored, as is any cut that would leave
/// a scene shorter than `min_scene_frames`. With no usable cut the result is
/// a single segment.
pub fn build_segments(cuts: &[f64], info: &VideoInfo, min_scene_frames: u64) -> Vec<SceneSegment> {
    let duration = info.duration.max(0.0);
    let min_len = if info.fps > 0.0 {
        min_scene_frames as f64 / info.fps
    } else {
        0.0
    };

    let mut sorted: Vec<f64> = cuts
        .iter()
        .copied()
        .filter(|t| *t > 0.0 && *t < duration)
        .collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut boundaries = vec![0.0];
    for cut in sorted {
        let last = boundaries[boundaries.len() - 1];
        if cut - last >= min_len && duration - cut >= min_len {
            boundaries.push(cut);
        }
    }
    boundaries.push(duration);

    boundaries
        .windows(2)
        .enumerate()
        .map(|(index, pair)| SceneSegment {
            index: index as u32,
            start_time: pair[0],
            end_time: pair[1],
            start_frame: seconds_to_frame(pair[0], info.fps),
            end_frame: seconds_to_frame(pair[1], info.fps),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(duration: f64, fps: f64) -> VideoInfo {
        VideoInfo {
            duration,
            width: 640,
            height: 360,
            fps,
            codec: "h264".into(),
            has_audio: false,
            size: 0,
        }
    }

    fn assert_contiguous(segments: &[SceneSegment], duration: f64) {
        assert!(!segments.is_empty());
        assert_eq!(segments[0].start_time, 0.0);
        assert_eq!(segments.last().unwrap().end_time, duration);
        for (i, pair) in segments.windows(2).enumerate() {
            assert_eq!(pair[0].end_time, pair[1].start_time);
            assert_eq!(pair[0].end_frame, pair[1].start_frame);
            assert_eq!(pair[0].index as usize, i);
            assert!(pair[0].start_time < pair[0].end_time);
        }
    }

    #[test]
    fn test_no_cuts_single_segment() {
        let segments = build_segments(&[], &info(10.0, 25.0), 15);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end_frame, 250);
        assert_contiguous(&segments, 10.0);
    }

    #[test]
    fn test_cuts_become_boundaries() {
        let segments = build_segments(&[6.0, 2.5], &info(10.0, 25.0), 15);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].start_time, 2.5);
        assert_eq!(segments[1].start_frame, 63);
        assert_eq!(segments[2].start_time, 6.0);
        assert_contiguous(&segments, 10.0);
    }

    #[test]
    fn test_short_scenes_are_merged() {
        // 0.2s apart at 25fps is 5 frames, below the 15 frame minimum
        let segments = build_segments(&[3.0, 3.2, 9.9], &info(10.0, 25.0), 15);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].start_time, 3.0);
        assert_contiguous(&segments, 10.0);
    }

    #[test]
    fn test_out_of_range_cuts_ignored() {
        let segments = build_segments(&[-1.0, 0.0, 10.0, 42.0], &info(10.0, 30.0), 0);
        assert_eq!(segments.len(), 1);
        assert_contiguous(&segments, 10.0);
    }

    #[test]
    fn test_zero_duration() {
        let segments = build_segments(&[], &info(0.0, 30.0), 15);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end_frame, 0);
    }

    #[test]
    fn test_parse_pts_time() {
        let line = "[Parsed_showinfo_1 @ 0x55d] n:   0 pts: 126126 pts_time:4.20420 duration:  3003 pos: 1 fmt:yuv420p";
        assert!((parse_pts_time(line).unwrap() - 4.2042).abs() < 1e-9);
        assert!(parse_pts_time("[Parsed_showinfo_1 @ 0x55d] config in time_base: 1/30000").is_none());
        assert!(parse_pts_time("pts_time:nan").is_none());
    }
}
