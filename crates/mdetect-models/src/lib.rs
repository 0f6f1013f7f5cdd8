//! Shared data models for the marine detection service.
//!
//! This crate provides Serde-serializable types for:
//! - Detections, bounding boxes and per-frame results
//! - EXIF-derived image rotation
//! - HTTP byte-range parsing
//! - Model manifest entries
//! - Transcode jobs and API response bodies

pub mod api;
pub mod detection;
pub mod job;
pub mod manifest;
pub mod range;
pub mod rect;
pub mod rotation;

// Re-export common types
pub use api::{
    CleanupReport, FileFailure, ImagePredictionResponse, MessageResponse, ModelInfo,
    VideoPredictionResponse,
};
pub use detection::{Detection, FrameResult};
pub use job::{TranscodeJob, TranscodeJobId, TranscodeStatus};
pub use manifest::{ManifestFile, ModelSpec, DEFAULT_CONFIDENCE_THRESHOLD};
pub use range::{ByteRange, RangeError};
pub use rect::BoundingBox;
pub use rotation::Rotation;
