//! Client for the speech-to-text inference service.
//!
//! The service speaks the Whisper-compatible
//! `POST /v1/audio/transcriptions` API (faster-whisper-server,
//! whisper.cpp server, OpenAI), returning timestamped segments.

pub mod client;
pub mod error;
pub mod types;

pub use client::{MlClientConfig, TranscriptionClient};
pub use error::{MlError, MlResult};
pub use types::{HealthResponse, TranscriptionResponse, WireSegment};
