//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vidlens_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vidlens_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vidlens_http_requests_in_flight";

    // Submission metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "vidlens_jobs_submitted_total";
    pub const SUBMISSIONS_REJECTED_TOTAL: &str = "vidlens_submissions_rejected_total";
    pub const ACQUIRE_DURATION_SECONDS: &str = "vidlens_acquire_duration_seconds";

    // Retention metrics
    pub const JOBS_EVICTED_TOTAL: &str = "vidlens_jobs_evicted_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "vidlens_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an accepted submission (`upload` or `url`).
pub fn record_job_submitted(source: &str) {
    let labels = [("source", source.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

/// Record a submission refused before a job was created.
pub fn record_submission_rejected(source: &str, reason: &str) {
    let labels = [
        ("source", source.to_string()),
        ("reason", reason.to_string()),
    ];
    counter!(names::SUBMISSIONS_REJECTED_TOTAL, &labels).increment(1);
}

/// Record how long media acquisition took (upload move or download).
pub fn record_acquire_duration(source: &str, duration_secs: f64) {
    let labels = [("source", source.to_string())];
    histogram!(names::ACQUIRE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_jobs_evicted(count: usize) {
    counter!(names::JOBS_EVICTED_TOTAL).increment(count as u64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels.
///
/// Job ids collapse to `:id` and served media files to `/uploads/:file`,
/// keeping label cardinality bounded.
fn sanitize_path(path: &str) -> String {
    if path.starts_with("/uploads/") {
        return "/uploads/:file".to_string();
    }

    path.split('/')
        .map(|segment| {
            if uuid::Uuid::parse_str(segment).is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/analyze/550e8400-e29b-41d4-a716-446655440000"),
            "/analyze/:id"
        );
        assert_eq!(
            sanitize_path("/jobs/550e8400-e29b-41d4-a716-446655440000/cancel"),
            "/jobs/:id/cancel"
        );
        assert_eq!(
            sanitize_path("/uploads/550e8400-e29b-41d4-a716-446655440000_clip.mp4"),
            "/uploads/:file"
        );
        assert_eq!(sanitize_path("/upload-url"), "/upload-url");
    }
}
