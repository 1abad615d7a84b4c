//! Stage runners.
//!
//! Every stage turns a local video into one [`StageOutput`] variant. The
//! orchestrator only sees the [`StageRunner`] trait, so any stage can be
//! replaced (fakes in tests, another model in production).

mod detection;
mod scene;
mod transcription;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use vidlens_ml_client::TranscriptionClient;
use vidlens_models::{ObjectTimeline, SceneSegment, StageKind, TranscriptSegment};

pub use detection::{group_detections, ObjectDetectionStage};
pub use scene::SceneSegmentationStage;
pub use transcription::TranscriptionStage;

use crate::config::WorkerConfig;
use crate::error::StageResult;

/// Output of one stage, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Scenes(Vec<SceneSegment>),
    Transcript(Vec<TranscriptSegment>),
    Objects(ObjectTimeline),
}

impl StageOutput {
    pub fn kind(&self) -> StageKind {
        match self {
            StageOutput::Scenes(_) => StageKind::SceneSegmentation,
            StageOutput::Transcript(_) => StageKind::Transcription,
            StageOutput::Objects(_) => StageKind::ObjectDetection,
        }
    }
}

/// One analysis stage.
#[async_trait]
pub trait StageRunner: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn analyze(&self, video: &Path) -> StageResult<StageOutput>;
}

/// The stages a pipeline runs, in execution order.
#[derive(Clone)]
pub struct StageSet {
    runners: Vec<Arc<dyn StageRunner>>,
}

impl StageSet {
    /// Order runners by [`StageKind::ALL`], whatever order they are given in.
    pub fn new(mut runners: Vec<Arc<dyn StageRunner>>) -> Self {
        runners.sort_by_key(|r| {
            StageKind::ALL
                .iter()
                .position(|k| *k == r.kind())
                .unwrap_or(usize::MAX)
        });
        Self { runners }
    }

    /// The production stages.
    pub fn standard(config: &WorkerConfig, transcription: TranscriptionClient) -> Self {
        Self::new(vec![
            Arc::new(SceneSegmentationStage::new(config.scenes.clone())),
            Arc::new(TranscriptionStage::new(transcription)),
            Arc::new(ObjectDetectionStage::new(
                config.detector.clone(),
                config.detection_stride_secs,
            )),
        ])
    }

    pub fn runners(&self) -> &[Arc<dyn StageRunner>] {
        &self.runners
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.runners.iter().map(|r| r.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}
