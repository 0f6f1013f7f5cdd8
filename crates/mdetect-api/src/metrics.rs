//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use mdetect_models::CleanupReport;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "mdetect_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "mdetect_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "mdetect_http_requests_in_flight";

    // Prediction metrics
    pub const PREDICTIONS_TOTAL: &str = "mdetect_predictions_total";
    pub const PREDICTION_DURATION_SECONDS: &str = "mdetect_prediction_duration_seconds";
    pub const VIDEO_JOBS_ACTIVE: &str = "mdetect_video_jobs_active";

    // Transcode metrics
    pub const TRANSCODES_SUBMITTED_TOTAL: &str = "mdetect_transcodes_submitted_total";
    pub const TRANSCODES_FINISHED_TOTAL: &str = "mdetect_transcodes_finished_total";

    // Lifecycle metrics
    pub const ARTIFACTS_REMOVED_TOTAL: &str = "mdetect_artifacts_removed_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "mdetect_rate_limit_hits_total";
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

/// Record a finished prediction request.
pub fn record_prediction(kind: &'static str, success: bool, duration_secs: f64) {
    let labels = [
        ("kind", kind.to_string()),
        ("result", if success { "success" } else { "error" }.to_string()),
    ];
    counter!(names::PREDICTIONS_TOTAL, &labels).increment(1);
    histogram!(names::PREDICTION_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Update the number of running video jobs.
pub fn set_video_jobs_active(count: usize) {
    gauge!(names::VIDEO_JOBS_ACTIVE).set(count as f64);
}

/// Record a transcode job submission.
pub fn record_transcode_submitted() {
    counter!(names::TRANSCODES_SUBMITTED_TOTAL).increment(1);
}

/// Record a transcode job result.
pub fn record_transcode_finished(success: bool) {
    let labels = [("result", if success { "completed" } else { "failed" }.to_string())];
    counter!(names::TRANSCODES_FINISHED_TOTAL, &labels).increment(1);
}

/// Record an artifact sweep.
pub fn record_cleanup(report: &CleanupReport) {
    for (kind, count) in [
        ("file", report.files_removed),
        ("dir", report.dirs_removed),
        ("job", report.jobs_pruned),
    ] {
        let labels = [("kind", kind.to_string())];
        counter!(names::ARTIFACTS_REMOVED_TOTAL, &labels).increment(count as u64);
    }
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

fn path_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}", ":id"),
            (r"^/results/.+$", "/results/:path"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
        .collect()
    })
}

/// Sanitize path for metrics labels (remove IDs and file names).
fn sanitize_path(path: &str) -> String {
    path_patterns()
        .iter()
        .fold(path.to_string(), |path, (re, replacement)| {
            re.replace_all(&path, *replacement).to_string()
        })
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
            sanitize_path("/transcode/550e8400-e29b-41d4-a716-446655440000"),
            "/transcode/:id"
        );
        assert_eq!(sanitize_path("/results/hls_dive.mp4/segment_001.ts"), "/results/:path");
        assert_eq!(sanitize_path("/predict/video"), "/predict/video");
    }
}
