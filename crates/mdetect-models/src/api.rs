//! HTTP response bodies.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Simple `{"message": ...}` body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A file the batch pipeline could not process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Response of `POST /predict/images`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImagePredictionResponse {
    /// Folder holding the annotated images
    pub result_folder: String,
    /// Number of images written
    pub processed: usize,
    /// Images that failed, with reasons
    pub failed: Vec<FileFailure>,
}

/// Response of `POST /predict/video`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoPredictionResponse {
    /// Annotated video file name under the results route
    pub result_video_filename: String,
    /// Playlist URL, available once the transcode job completes
    pub hls_url: String,
    /// Transcode job to poll
    pub job_id: String,
    pub frames_written: u64,
    pub frames_dropped: u64,
}

/// One entry of `GET /models`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModelInfo {
    pub name: String,
    pub path: String,
    pub threshold: f32,
}

/// Result of an artifact sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub jobs_pruned: usize,
}
