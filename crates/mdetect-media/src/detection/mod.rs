//! Object detection: detectors, caching, model discovery and ensembles.

pub mod cache;
pub mod ensemble;
pub mod manifest;
pub mod yolo;

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use mdetect_models::Detection;

use crate::error::MediaResult;

pub use cache::DetectorCache;
pub use ensemble::{Ensemble, EnsembleMember, FailurePolicy};
pub use manifest::ModelManifest;
pub use yolo::{YoloConfig, YoloDetector, YoloLoader};

/// A loaded object-detection model.
///
/// Implementations must only report detections whose confidence is at least
/// `confidence_threshold`.
pub trait Detector: Send + Sync {
    /// Model name used in logs.
    fn name(&self) -> &str;

    /// Detect objects in an RGB frame. Boxes are in the frame's pixel space.
    fn detect(&self, image: &RgbImage, confidence_threshold: f32) -> MediaResult<Vec<Detection>>;
}

/// Turns a weight file into a detector.
pub trait DetectorLoader: Send + Sync {
    fn load(&self, path: &Path) -> MediaResult<Arc<dyn Detector>>;
}
