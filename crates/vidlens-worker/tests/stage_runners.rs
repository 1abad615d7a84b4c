//! Production stage runners over clips generated with ffmpeg.
//!
//! Every test returns early when ffmpeg or ffprobe is not installed. The
//! object detector is replaced by a fixed in-process detector, and the
//! transcription service by a wiremock server.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidlens_jobs::JobRegistry;
use vidlens_media::{
    check_ffmpeg, check_ffprobe, Detection, FrameDetector, MediaResult, ObjectDetectorConfig,
    SceneDetectorConfig,
};
use vidlens_ml_client::{MlClientConfig, TranscriptionClient};
use vidlens_models::{FailurePolicy, Job, JobId, JobSource, JobStatus};
use vidlens_worker::stages::{ObjectDetectionStage, SceneSegmentationStage, TranscriptionStage};
use vidlens_worker::{PipelineOrchestrator, StageOutput, StageRunner, StageSet};

/// COCO id of `tv`.
const TV_CLASS: usize = 62;

/// Sees one tv in every frame.
struct StaticTv;

impl FrameDetector for StaticTv {
    fn detect(&self, _frame: &DynamicImage) -> MediaResult<Vec<Detection>> {
        Ok(vec![Detection {
            x: 0.25,
            y: 0.25,
            width: 0.5,
            height: 0.5,
            class_id: TV_CLASS,
            confidence: 0.87,
        }])
    }
}

fn ffmpeg_available() -> bool {
    if check_ffmpeg().is_err() || check_ffprobe().is_err() {
        eprintln!("ffmpeg/ffprobe not installed, skipping");
        return false;
    }
    true
}

/// Encode a static 10 s, 25 fps clip; with `tone`, add a sine audio track.
fn static_clip(dir: &TempDir, tone: bool) -> PathBuf {
    let out = dir.path().join(if tone { "tone.mp4" } else { "silent.mp4" });
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-y", "-hide_banner", "-loglevel", "error"])
        .args(["-f", "lavfi", "-i", "color=c=gray:s=160x120:r=25:d=10"]);
    if tone {
        cmd.args(["-f", "lavfi", "-i", "sine=frequency=440:duration=10"])
            .args(["-c:a", "aac", "-shortest"]);
    } else {
        cmd.arg("-an");
    }
    cmd.args(["-c:v", "mpeg4", "-q:v", "5", "-pix_fmt", "yuv420p"])
        .arg(&out);

    let status = cmd.status().unwrap();
    assert!(status.success(), "ffmpeg failed to generate {}", out.display());
    out
}

fn transcription_client(server: &MockServer) -> TranscriptionClient {
    TranscriptionClient::new(MlClientConfig {
        base_url: server.uri(),
        max_retries: 0,
        timeout: Duration::from_secs(10),
        ..Default::default()
    })
    .unwrap()
}

fn detection_stage() -> ObjectDetectionStage {
    ObjectDetectionStage::new(ObjectDetectorConfig::default(), 1.0).with_detector(Arc::new(StaticTv))
}

fn assert_covers(scenes: &[vidlens_models::SceneSegment], duration: f64) {
    assert!(!scenes.is_empty());
    assert_eq!(scenes[0].start_time, 0.0);
    for pair in scenes.windows(2) {
        assert_eq!(pair[0].end_time, pair[1].start_time);
    }
    let end = scenes[scenes.len() - 1].end_time;
    assert!((end - duration).abs() < 0.2, "scenes end at {}", end);
}

#[tokio::test]
async fn test_scene_stage_static_clip_is_one_scene() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clip = static_clip(&dir, false);

    let stage = SceneSegmentationStage::new(SceneDetectorConfig::default());
    let StageOutput::Scenes(scenes) = stage.analyze(&clip).await.unwrap() else {
        panic!("scene stage returned another output");
    };

    assert_eq!(scenes.len(), 1);
    assert_covers(&scenes, 10.0);
}

#[tokio::test]
async fn test_detection_stage_one_event_per_sampled_frame() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clip = static_clip(&dir, false);

    let StageOutput::Objects(timeline) = detection_stage().analyze(&clip).await.unwrap() else {
        panic!("detection stage returned another output");
    };

    assert_eq!(timeline.keys().collect::<Vec<_>>(), vec!["tv"]);
    let events = &timeline["tv"];
    assert!((9..=11).contains(&events.len()), "{} events", events.len());
    // Stride of 1 s at 25 fps
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.frame, i as u64 * 25);
        assert!((event.timestamp - i as f64).abs() < 1e-6);
    }
}

#[tokio::test]
async fn test_transcription_stage_silent_clip_skips_service() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clip = static_clip(&dir, false);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let stage = TranscriptionStage::new(transcription_client(&server));
    let output = stage.analyze(&clip).await.unwrap();
    assert_eq!(output, StageOutput::Transcript(Vec::new()));
}

#[tokio::test]
async fn test_transcription_stage_sends_extracted_audio() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clip = static_clip(&dir, true);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "a steady tone",
            "segments": [{"start": 0.0, "end": 3.5, "text": " a steady tone"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stage = TranscriptionStage::new(transcription_client(&server));
    let StageOutput::Transcript(segments) = stage.analyze(&clip).await.unwrap() else {
        panic!("transcription stage returned another output");
    };
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].text, "a steady tone");
}

#[tokio::test]
async fn test_pipeline_silent_clip_with_static_object() {
    if !ffmpeg_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let clip = static_clip(&dir, false);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let registry = JobRegistry::in_memory();
    let job = Job::new(JobId::new(), JobSource::Upload, "silent.mp4", clip.as_path())
        .with_policy(FailurePolicy::Abort);
    let id = job.id.clone();
    registry.create(job).await.unwrap();

    let stages: Vec<Arc<dyn StageRunner>> = vec![
        Arc::new(SceneSegmentationStage::new(SceneDetectorConfig::default())),
        Arc::new(TranscriptionStage::new(transcription_client(&server))),
        Arc::new(detection_stage()),
    ];
    let orchestrator =
        PipelineOrchestrator::new(registry.clone(), StageSet::new(stages), Duration::from_secs(60));

    let job = orchestrator.run(&id, &CancellationToken::new()).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);

    let result = registry.result(&id).await.unwrap();
    assert!(result.transcript.is_empty());
    assert_covers(&result.scenes, 10.0);
    let events = result.objects["tv"].len();
    assert!((9..=11).contains(&events), "{} events", events);
    assert!(!result.objects.contains_key("person"));
}
