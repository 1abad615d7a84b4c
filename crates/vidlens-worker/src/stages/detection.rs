use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use vidlens_media::{
    probe_video, Detection, FrameDetector, FrameSampler, ObjectDetectorConfig, SampledFrame,
    YoloDetector,
};
use vidlens_models::{ObjectEvent, ObjectTimeline, StageKind};

use super::{StageOutput, StageRunner};
use crate::error::{StageError, StageResult};

/// Per-frame object detection on sampled frames.
///
/// The detector is loaded on first use and shared by every later job; a
/// failed load fails the stage and is retried by the next job.
pub struct ObjectDetectionStage {
    config: ObjectDetectorConfig,
    sampler: FrameSampler,
    detector: OnceCell<Arc<dyn FrameDetector>>,
}

impl ObjectDetectionStage {
    pub fn new(config: ObjectDetectorConfig, stride_secs: f64) -> Self {
        Self {
            config,
            sampler: FrameSampler::new(stride_secs),
            detector: OnceCell::new(),
        }
    }

    /// Use an already constructed detector instead of loading the model.
    pub fn with_detector(mut self, detector: Arc<dyn FrameDetector>) -> Self {
        self.detector = OnceCell::new_with(Some(detector));
        self
    }

    async fn detector(&self) -> StageResult<Arc<dyn FrameDetector>> {
        let detector = self
            .detector
            .get_or_try_init(|| async {
                let config = self.config.clone();
                let detector = tokio::task::spawn_blocking(move || YoloDetector::new(config)).await??;
                Ok::<_, StageError>(Arc::new(detector) as Arc<dyn FrameDetector>)
            })
            .await?;
        Ok(Arc::clone(detector))
    }
}

#[async_trait]
impl StageRunner for ObjectDetectionStage {
    fn kind(&self) -> StageKind {
        StageKind::ObjectDetection
    }

    async fn analyze(&self, video: &Path) -> StageResult<StageOutput> {
        let detector = self.detector().await?;
        let info = probe_video(video).await?;
        let sampled = self.sampler.sample(video, &info).await?;
        let frames = sampled.frames.clone();
        let count = frames.len();

        let per_frame = tokio::task::spawn_blocking(move || detect_frames(detector.as_ref(), &frames))
            .await??;
        drop(sampled);

        let timeline = group_detections(per_frame);
        info!(
            path = %video.display(),
            frames = count,
            classes = timeline.len(),
            "Object detection complete"
        );
        Ok(StageOutput::Objects(timeline))
    }
}

fn detect_frames(
    detector: &dyn FrameDetector,
    frames: &[SampledFrame],
) -> StageResult<Vec<(SampledFrame, Vec<Detection>)>> {
    let mut out = Vec::with_capacity(frames.len());
    for frame in frames {
        let image = image::open(&frame.path).map_err(|e| {
            StageError::failed(
                StageKind::ObjectDetection,
                format!("cannot decode {}: {}", frame.path.display(), e),
            )
        })?;
        let detections = detector.detect(&image)?;
        debug!(frame = frame.index, detections = detections.len(), "Frame analyzed");
        out.push((frame.clone(), detections));
    }
    Ok(out)
}

/// Build the class timeline: one event per detected instance per frame.
///
/// Classes never detected get no key. Events stay in frame order.
pub fn group_detections(per_frame: Vec<(SampledFrame, Vec<Detection>)>) -> ObjectTimeline {
    let mut timeline = ObjectTimeline::new();
    for (frame, detections) in per_frame {
        for detection in detections {
            timeline
                .entry(detection.label())
                .or_default()
                .push(ObjectEvent {
                    timestamp: frame.timestamp,
                    confidence: detection.confidence,
                    frame: frame.index,
                });
        }
    }
    for events in timeline.values_mut() {
        events.sort_by_key(|e| e.frame);
    }
    timeline
}
