//! Video analysis worker.
//!
//! This crate provides:
//! - Stage runners (scene segmentation, transcription, object detection)
//! - The pipeline orchestrator and its failure policies
//! - A bounded, supervised executor with cancellation
//! - Result artifacts on disk

pub mod artifacts;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod stages;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use artifacts::ResultWriter;
pub use config::WorkerConfig;
pub use error::{StageError, StageResult, WorkerError, WorkerResult};
pub use executor::PipelineExecutor;
pub use logging::JobLogger;
pub use pipeline::PipelineOrchestrator;
pub use stages::{StageOutput, StageRunner, StageSet};
