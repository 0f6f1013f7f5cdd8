//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const DETECTOR_CACHE_TOTAL: &str = "mdetect_detector_cache_total";
    pub const DETECTOR_FAILURES_TOTAL: &str = "mdetect_detector_failures_total";
    pub const IMAGES_TOTAL: &str = "mdetect_images_total";
    pub const FRAMES_WRITTEN_TOTAL: &str = "mdetect_frames_written_total";
    pub const FRAMES_DROPPED_TOTAL: &str = "mdetect_frames_dropped_total";
}

/// Record a detector cache lookup.
pub fn record_detector_cache(hit: bool) {
    let labels = [("result", if hit { "hit" } else { "miss" }.to_string())];
    counter!(names::DETECTOR_CACHE_TOTAL, &labels).increment(1);
}

/// Record a detector failing on one frame or image.
pub fn record_detector_failure(model: &str) {
    let labels = [("model", model.to_string())];
    counter!(names::DETECTOR_FAILURES_TOTAL, &labels).increment(1);
}

/// Record one still image processed by the batch pipeline.
pub fn record_image(success: bool) {
    let labels = [("status", if success { "ok" } else { "failed" }.to_string())];
    counter!(names::IMAGES_TOTAL, &labels).increment(1);
}

/// Record an annotated video frame written.
pub fn record_frame_written() {
    counter!(names::FRAMES_WRITTEN_TOTAL).increment(1);
}

/// Record a video frame dropped from the output.
pub fn record_frame_dropped(reason: &'static str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::FRAMES_DROPPED_TOTAL, &labels).increment(1);
}
