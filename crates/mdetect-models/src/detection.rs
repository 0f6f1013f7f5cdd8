//! Detections and per-frame results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, Rotation};

/// One recognized object produced by a single detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Region in pixel coordinates of the analyzed frame
    pub bbox: BoundingBox,
    /// Class index within the producing model
    pub class_id: usize,
    /// Human-readable class label
    pub label: String,
    /// Confidence score [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: usize, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            label: label.into(),
            confidence,
        }
    }

    /// Text burned into the label tab, e.g. `"fish 0.87"`.
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }
}

/// All detections from all detectors for one frame or image.
///
/// Detections are concatenated in ensemble order. No deduplication or
/// cross-model matching is performed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameResult {
    pub detections: Vec<Detection>,
}

impl FrameResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one detector's output.
    pub fn extend(&mut self, detections: impl IntoIterator<Item = Detection>) {
        self.detections.extend(detections);
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    /// Map every box through a rotation of a `width` x `height` frame.
    pub fn rotated(&self, rotation: Rotation, width: u32, height: u32) -> FrameResult {
        FrameResult {
            detections: self
                .detections
                .iter()
                .map(|d| Detection {
                    bbox: d.bbox.rotate(rotation, width, height),
                    ..d.clone()
                })
                .collect(),
        }
    }
}

impl From<Vec<Detection>> for FrameResult {
    fn from(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}
