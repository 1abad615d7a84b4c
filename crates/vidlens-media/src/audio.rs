//! Audio extraction for speech recognition.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Sample rate expected by Whisper-family models.
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Extract the first audio track of `video` as 16 kHz mono PCM WAV.
pub async fn extract_speech_audio(
    video: &Path,
    output: &Path,
    timeout_secs: Option<u64>,
) -> MediaResult<()> {
    let cmd = speech_audio_command(video, output);

    let mut runner = FfmpegRunner::new();
    if let Some(secs) = timeout_secs {
        runner = runner.with_timeout(secs);
    }
    runner.run(&cmd).await
}

fn speech_audio_command(video: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(video, output).no_video().output_args([
        "-map".to_string(),
        "0:a:0".to_string(),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        SPEECH_SAMPLE_RATE.to_string(),
        "-c:a".to_string(),
        "pcm_s16le".to_string(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_audio_args() {
        let args = speech_audio_command(Path::new("in.mp4"), Path::new("out.wav")).build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-vn -map 0:a:0 -ac 1 -ar 16000 -c:a pcm_s16le out.wav"));
    }
}
