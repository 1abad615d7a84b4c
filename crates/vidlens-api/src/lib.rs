//! Axum HTTP API server for video analysis jobs.
//!
//! This crate provides:
//! - Upload and URL submission with synchronous media acquisition
//! - Job status, result and cancellation endpoints
//! - Per-IP rate limiting and security headers
//! - Prometheus metrics
//! - Opt-in retention of finished jobs

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{RetentionSweeper, SubmissionGateway};
pub use state::AppState;
