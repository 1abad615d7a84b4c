use std::path::Path;

use async_trait::async_trait;
use vidlens_media::{SceneDetector, SceneDetectorConfig};
use vidlens_models::StageKind;

use super::{StageOutput, StageRunner};
use crate::error::StageResult;

/// Content-change scene segmentation.
pub struct SceneSegmentationStage {
    detector: SceneDetector,
}

impl SceneSegmentationStage {
    pub fn new(config: SceneDetectorConfig) -> Self {
        Self {
            detector: SceneDetector::new(config),
        }
    }
}

#[async_trait]
impl StageRunner for SceneSegmentationStage {
    fn kind(&self) -> StageKind {
        StageKind::SceneSegmentation
    }

    async fn analyze(&self, video: &Path) -> StageResult<StageOutput> {
        let scenes = self.detector.detect(video).await?;
        Ok(StageOutput::Scenes(scenes))
    }
}
