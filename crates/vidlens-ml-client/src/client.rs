//! Transcription service HTTP client.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use vidlens_models::TranscriptSegment;

use crate::error::{MlError, MlResult};
use crate::types::{HealthResponse, TranscriptionResponse};

const TRANSCRIPTIONS_PATH: &str = "/v1/audio/transcriptions";
const MAX_BACKOFF_DOUBLINGS: u32 = 10;

/// Configuration for the transcription client.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL of the service
    pub base_url: String,
    /// Model identifier sent with each request
    pub model: String,
    /// Spoken language hint (ISO-639-1); autodetect when unset
    pub language: Option<String>,
    /// Bearer token, for hosted APIs
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            model: "base".to_string(),
            language: None,
            api_key: None,
            timeout: Duration::from_secs(600), // long videos transcribe slowly on CPU
            max_retries: 2,
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TRANSCRIPTION_URL").unwrap_or(defaults.base_url),
            model: std::env::var("TRANSCRIPTION_MODEL").unwrap_or(defaults.model),
            language: std::env::var("TRANSCRIPTION_LANGUAGE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            api_key: std::env::var("TRANSCRIPTION_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            timeout: Duration::from_secs(
                std::env::var("TRANSCRIPTION_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.timeout.as_secs()),
            ),
            max_retries: std::env::var("TRANSCRIPTION_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// Client for a Whisper-compatible transcription service.
#[derive(Clone)]
pub struct TranscriptionClient {
    http: Client,
    config: MlClientConfig,
}

impl TranscriptionClient {
    /// Create a new client.
    pub fn new(config: MlClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(MlClientConfig::from_env())
    }

    pub fn config(&self) -> &MlClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the service is healthy.
    pub async fn health_check(&self) -> MlResult<bool> {
        let url = self.endpoint("/health");

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                // Some servers answer with an empty body
                let body = response.text().await?;
                if body.trim().is_empty() {
                    return Ok(true);
                }
                let health: HealthResponse = serde_json::from_str(&body)?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Transcription service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Transcription service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Transcribe a WAV file into ordered segments.
    pub async fn transcribe_file(&self, audio_path: &Path) -> MlResult<Vec<TranscriptSegment>> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let url = self.endpoint(TRANSCRIPTIONS_PATH);
        debug!(url = %url, size = bytes.len(), "Sending transcription request");

        let response = self
            .with_retry(|| async {
                let form = self.build_form(bytes.clone(), file_name.clone())?;
                let mut request = self.http.post(&url).multipart(form);
                if let Some(key) = &self.config.api_key {
                    request = request.bearer_auth(key);
                }
                let response = request.send().await.map_err(MlError::Network)?;

                let status = response.status();
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    let body = response.text().await.unwrap_or_default();
                    return Err(MlError::ServiceUnavailable(format!("{}: {}", status, body)));
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(MlError::RequestFailed(format!(
                        "Transcription service returned {}: {}",
                        status, body
                    )));
                }
                Ok(response)
            })
            .await?;

        let body = response.text().await?;
        let parsed: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|e| MlError::InvalidResponse(format!("{}: {}", e, truncate(&body, 200))))?;

        Ok(parsed.into_segments())
    }

    fn build_form(&self, bytes: Vec<u8>, file_name: String) -> MlResult<Form> {
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(MlError::Network)?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");
        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }
        Ok(form)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = retry_delay(attempt);
                    warn!(
                        "Transcription request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Exponential backoff from 500 ms, doubling up to the tenth attempt.
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.saturating_pow(attempt.min(MAX_BACKOFF_DOUBLINGS)))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_retry_delay_is_bounded() {
        assert_eq!(retry_delay(0), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(2000));
        assert_eq!(retry_delay(10), Duration::from_millis(512_000));
        assert_eq!(retry_delay(64), retry_delay(10));
        assert_eq!(retry_delay(u32::MAX), retry_delay(10));
    }

    fn client(server: &MockServer, max_retries: u32) -> TranscriptionClient {
        TranscriptionClient::new(MlClientConfig {
            base_url: server.uri(),
            max_retries,
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    fn wav(dir: &TempDir) -> std::path::PathBuf {
        let p = dir.path().join("audio.wav");
        std::fs::write(&p, b"RIFF....WAVE").unwrap();
        p
    }

    #[test]
    fn test_config_defaults() {
        let config = MlClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.model, "base");
        assert_eq!(config.timeout, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_transcribe_parses_segments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "hello there",
                "language": "en",
                "segments": [
                    {"start": 0.0, "end": 1.2, "text": " hello"},
                    {"start": 1.2, "end": 2.0, "text": " there"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let segments = client(&server, 0).transcribe_file(&wav(&dir)).await.unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello");
        assert_eq!(segments[1].end, 2.0);
    }

    #[tokio::test]
    async fn test_transcribe_retries_on_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "", "segments": []})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let segments = client(&server, 2).transcribe_file(&wav(&dir)).await.unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_transcribe_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad audio"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = client(&server, 3).transcribe_file(&wav(&dir)).await.unwrap_err();
        assert!(matches!(err, MlError::RequestFailed(ref m) if m.contains("bad audio")));
    }

    #[tokio::test]
    async fn test_transcribe_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = client(&server, 0).transcribe_file(&wav(&dir)).await.unwrap_err();
        assert!(matches!(err, MlError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_api_key_sent_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"segments": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = TranscriptionClient::new(MlClientConfig {
            base_url: server.uri(),
            api_key: Some("secret".into()),
            ..Default::default()
        })
        .unwrap();
        let dir = TempDir::new().unwrap();
        client.transcribe_file(&wav(&dir)).await.unwrap();
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        assert!(client(&server, 0).health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(!client(&server, 0).health_check().await.unwrap());
    }
}
