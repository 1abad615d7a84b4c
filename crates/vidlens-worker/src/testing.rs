//! In-process stage runners for pipeline tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use vidlens_models::{ObjectEvent, ObjectTimeline, SceneSegment, StageKind, TranscriptSegment};

use crate::error::{StageError, StageResult};
use crate::stages::{StageOutput, StageRunner};

/// Returns a fixed output: two scenes over a 10 s, 30 fps video, one
/// transcript segment, and a person seen on three frames.
pub struct FixedStage(pub StageKind);

impl FixedStage {
    pub fn scenes() -> Arc<dyn StageRunner> {
        Arc::new(Self(StageKind::SceneSegmentation))
    }

    pub fn transcript() -> Arc<dyn StageRunner> {
        Arc::new(Self(StageKind::Transcription))
    }

    pub fn objects() -> Arc<dyn StageRunner> {
        Arc::new(Self(StageKind::ObjectDetection))
    }

    pub fn all() -> Vec<Arc<dyn StageRunner>> {
        vec![Self::scenes(), Self::transcript(), Self::objects()]
    }

    pub fn output(kind: StageKind) -> StageOutput {
        match kind {
            StageKind::SceneSegmentation => StageOutput::Scenes(vec![
                SceneSegment {
                    index: 0,
                    start_time: 0.0,
                    end_time: 5.0,
                    start_frame: 0,
                    end_frame: 150,
                },
                SceneSegment {
                    index: 1,
                    start_time: 5.0,
                    end_time: 10.0,
                    start_frame: 150,
                    end_frame: 300,
                },
            ]),
            StageKind::Transcription => StageOutput::Transcript(vec![TranscriptSegment {
                start: 0.5,
                end: 2.0,
                text: "hello there".to_string(),
            }]),
            StageKind::ObjectDetection => {
                let mut timeline = ObjectTimeline::new();
                timeline.insert(
                    "person".to_string(),
                    [0u64, 30, 180]
                        .into_iter()
                        .map(|frame| ObjectEvent {
                            timestamp: frame as f64 / 30.0,
                            confidence: 0.9,
                            frame,
                        })
                        .collect(),
                );
                StageOutput::Objects(timeline)
            }
        }
    }
}

#[async_trait]
impl StageRunner for FixedStage {
    fn kind(&self) -> StageKind {
        self.0
    }

    async fn analyze(&self, _video: &Path) -> StageResult<StageOutput> {
        Ok(Self::output(self.0))
    }
}

/// Always fails.
pub struct FailingStage(pub StageKind);

#[async_trait]
impl StageRunner for FailingStage {
    fn kind(&self) -> StageKind {
        self.0
    }

    async fn analyze(&self, _video: &Path) -> StageResult<StageOutput> {
        Err(StageError::failed(self.0, "decoder error"))
    }
}

/// Never finishes on its own; signals once it has started.
pub struct SlowStage {
    kind: StageKind,
    entered: Arc<Notify>,
}

impl SlowStage {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            entered: Arc::new(Notify::new()),
        }
    }

    pub fn entered(&self) -> Arc<Notify> {
        Arc::clone(&self.entered)
    }
}

#[async_trait]
impl StageRunner for SlowStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn analyze(&self, _video: &Path) -> StageResult<StageOutput> {
        self.entered.notify_one();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(FixedStage::output(self.kind))
    }
}

/// Panics inside the pipeline task.
pub struct PanickingStage(pub StageKind);

#[async_trait]
impl StageRunner for PanickingStage {
    fn kind(&self) -> StageKind {
        self.0
    }

    async fn analyze(&self, _video: &Path) -> StageResult<StageOutput> {
        panic!("detector state corrupted")
    }
}

/// Records the peak number of concurrent calls.
#[derive(Default)]
pub struct CountingStage {
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl CountingStage {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageRunner for CountingStage {
    fn kind(&self) -> StageKind {
        StageKind::SceneSegmentation
    }

    async fn analyze(&self, _video: &Path) -> StageResult<StageOutput> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(FixedStage::output(StageKind::SceneSegmentation))
    }
}
