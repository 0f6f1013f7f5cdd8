use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Rotation;

/// An axis-aligned box in pixel coordinates of the image the detector saw.
///
/// Edges are continuous coordinates: a box covering exactly pixel `(3, 0)`
/// is `x1 = 3, y1 = 0, x2 = 4, y2 = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// Left edge
    pub x1: f32,
    /// Top edge
    pub y1: f32,
    /// Right edge
    pub x2: f32,
    /// Bottom edge
    pub y2: f32,
}

impl BoundingBox {
    /// Create a new box from its corners.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a box from YOLO center format.
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x1: cx - width / 2.0,
            y1: cy - height / 2.0,
            x2: cx + width / 2.0,
            y2: cy + height / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Center point.
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Check that every coordinate is finite and the box is not inverted.
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|v| v.is_finite())
            && self.x2 >= self.x1
            && self.y2 >= self.y1
    }

    /// Clamp to an image of the given size.
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = BoundingBox::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .area();

        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Map the box through a rotation of an image that was `width` x `height`
    /// before rotating.
    pub fn rotate(&self, rotation: Rotation, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        match rotation {
            Rotation::None => *self,
            Rotation::Cw90 => Self::new(h - self.y2, self.x1, h - self.y1, self.x2),
            Rotation::Cw180 => Self::new(w - self.x2, h - self.y2, w - self.x1, h - self.y1),
            Rotation::Cw270 => Self::new(self.y1, w - self.x2, self.y2, w - self.x1),
        }
    }

    /// YOLO label format: normalized `(cx, cy, w, h)`.
    pub fn to_normalized_center(&self, width: u32, height: u32) -> (f32, f32, f32, f32) {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        let (cx, cy) = self.center();
        (cx / w, cy / h, self.width() / w, self.height() / h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_center() {
        let b = BoundingBox::from_center(50.0, 40.0, 20.0, 10.0);
        assert_eq!(b, BoundingBox::new(40.0, 35.0, 60.0, 45.0));
        assert!((b.area() - 200.0).abs() < 1e-4);
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);

        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);

        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_rotate_single_pixel() {
        // Pixel (3, 0) of a 4x2 image.
        let b = BoundingBox::new(3.0, 0.0, 4.0, 1.0);

        // Clockwise 90: (x, y) -> (h - 1 - y, x) on a 2x4 image.
        assert_eq!(b.rotate(Rotation::Cw90, 4, 2), BoundingBox::new(1.0, 3.0, 2.0, 4.0));
        // 180: (x, y) -> (w - 1 - x, h - 1 - y).
        assert_eq!(b.rotate(Rotation::Cw180, 4, 2), BoundingBox::new(0.0, 1.0, 1.0, 2.0));
        // Clockwise 270: (x, y) -> (y, w - 1 - x).
        assert_eq!(b.rotate(Rotation::Cw270, 4, 2), BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(b.rotate(Rotation::None, 4, 2), b);
    }

    #[test]
    fn test_rotate_round_trip() {
        let b = BoundingBox::new(10.0, 5.0, 30.0, 25.0);
        let once = b.rotate(Rotation::Cw90, 100, 50);
        // Rotated image is 50 x 100.
        let back = once.rotate(Rotation::Cw270, 50, 100);
        assert_eq!(back, b);
    }

    #[test]
    fn test_clamp_and_validity() {
        let b = BoundingBox::new(-5.0, -1.0, 120.0, 40.0).clamp(100, 50);
        assert_eq!(b, BoundingBox::new(0.0, 0.0, 100.0, 40.0));
        assert!(b.is_valid());
        assert!(!BoundingBox::new(f32::NAN, 0.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(5.0, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_normalized_center() {
        let b = BoundingBox::new(0.0, 0.0, 50.0, 25.0);
        let (cx, cy, w, h) = b.to_normalized_center(100, 50);
        assert!((cx - 0.25).abs() < 1e-6);
        assert!((cy - 0.25).abs() < 1e-6);
        assert!((w - 0.5).abs() < 1e-6);
        assert!((h - 0.5).abs() < 1e-6);
    }
}
