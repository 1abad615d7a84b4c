use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};
use vidlens_media::{extract_speech_audio, probe_video};
use vidlens_ml_client::TranscriptionClient;
use vidlens_models::StageKind;

use super::{StageOutput, StageRunner};
use crate::error::StageResult;

/// Speech-to-text over the transcription service.
///
/// Videos without an audio stream produce an empty transcript and never
/// reach the service.
pub struct TranscriptionStage {
    client: TranscriptionClient,
}

impl TranscriptionStage {
    pub fn new(client: TranscriptionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StageRunner for TranscriptionStage {
    fn kind(&self) -> StageKind {
        StageKind::Transcription
    }

    async fn analyze(&self, video: &Path) -> StageResult<StageOutput> {
        let info = probe_video(video).await?;
        if !info.has_audio {
            debug!(path = %video.display(), "No audio stream, skipping transcription");
            return Ok(StageOutput::Transcript(Vec::new()));
        }

        let scratch = tempfile::Builder::new()
            .prefix("vidlens-audio-")
            .tempdir()
            .map_err(vidlens_media::MediaError::from)?;
        let wav = scratch.path().join("speech.wav");
        extract_speech_audio(video, &wav, None).await?;

        let segments = self.client.transcribe_file(&wav).await?;
        info!(
            path = %video.display(),
            segments = segments.len(),
            "Transcription complete"
        );
        Ok(StageOutput::Transcript(segments))
    }
}
