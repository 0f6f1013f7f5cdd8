//! Display rotation derived from the EXIF orientation tag.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Clockwise rotation to apply to stored pixels before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Map an EXIF orientation value.
    ///
    /// Only the pure rotations (3, 6, 8) are honored; mirrored orientations
    /// and unknown values leave the image as stored.
    pub fn from_exif(tag: u32) -> Self {
        match tag {
            3 => Rotation::Cw180,
            6 => Rotation::Cw90,
            8 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    /// Map a clockwise angle in degrees; anything off a quarter turn is `None`.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Rotation::Cw90,
            180 => Rotation::Cw180,
            270 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    /// Whether width and height swap under this rotation.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }

    /// Image size after rotation.
    pub fn rotated_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }
}
