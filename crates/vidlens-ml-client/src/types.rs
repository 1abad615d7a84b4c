//! Transcription service wire types.

use serde::{Deserialize, Serialize};
use vidlens_models::TranscriptSegment;

/// `verbose_json` transcription response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Vec<WireSegment>,
}

/// A segment as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptionResponse {
    /// Ordered, non-empty transcript segments.
    pub fn into_segments(self) -> Vec<TranscriptSegment> {
        let mut segments: Vec<TranscriptSegment> = self
            .segments
            .into_iter()
            .filter_map(|s| {
                let text = s.text.trim();
                (!text.is_empty() && s.end >= s.start).then(|| TranscriptSegment {
                    start: s.start,
                    end: s.end,
                    text: text.to_string(),
                })
            })
            .collect();
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        segments
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_segments_orders_and_trims() {
        let response: TranscriptionResponse = serde_json::from_value(serde_json::json!({
            "text": "hello world",
            "segments": [
                {"id": 1, "start": 2.0, "end": 3.5, "text": " world "},
                {"id": 0, "start": 0.0, "end": 2.0, "text": " hello"},
                {"id": 2, "start": 3.5, "end": 4.0, "text": "   "}
            ]
        }))
        .unwrap();

        let segments = response.into_segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello");
        assert_eq!(segments[1].start, 2.0);
    }

    #[test]
    fn test_missing_segments_is_empty() {
        let response: TranscriptionResponse =
            serde_json::from_value(serde_json::json!({"text": ""})).unwrap();
        assert!(response.into_segments().is_empty());
    }
}
