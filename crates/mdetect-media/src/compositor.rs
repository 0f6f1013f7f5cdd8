//! Drawing detections onto frames and stills.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::imageops;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use mdetect_models::{Detection, FrameResult, Rotation};

use crate::error::{MediaError, MediaResult};

const BOX_THICKNESS: i32 = 2;
const DEFAULT_FONT_SIZE: f32 = 14.0;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Per-class colours, cycled by class id.
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

/// Outline colour for a class.
pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Produces the annotated frame for a detection result.
pub trait FrameRenderer: Send + Sync {
    fn render(&self, frame: RgbImage, result: &FrameResult) -> MediaResult<RgbImage>;
}

/// A decoded still image with its display rotation.
#[derive(Debug, Clone)]
pub struct Still {
    /// Pixels in stored order
    pub pixels: RgbImage,
    pub rotation: Rotation,
}

/// Decode a still image and read its EXIF orientation.
///
/// A missing or unreadable orientation is treated as no rotation.
pub fn read_still(path: &Path) -> MediaResult<Still> {
    let mut decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let rotation = decoder
        .orientation()
        .map(|o| Rotation::from_exif(u32::from(o.to_exif())))
        .unwrap_or_default();
    let pixels = DynamicImage::from_decoder(decoder)?.to_rgb8();

    Ok(Still { pixels, rotation })
}

/// Rotate pixels clockwise.
pub fn rotate_image(image: &RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::None => image.clone(),
        Rotation::Cw90 => imageops::rotate90(image),
        Rotation::Cw180 => imageops::rotate180(image),
        Rotation::Cw270 => imageops::rotate270(image),
    }
}

/// Draws boxes and label tabs in RGB.
#[derive(Clone)]
pub struct Compositor {
    font: Option<FontArc>,
    font_size: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            font: None,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(mut self, font: FontArc, font_size: f32) -> Self {
        self.font = Some(font);
        self.font_size = font_size.max(1.0);
        self
    }

    /// Load a TrueType/OpenType font for label text.
    pub fn with_font_file(self, path: &Path, font_size: f32) -> MediaResult<Self> {
        let bytes = std::fs::read(path)?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| MediaError::internal(format!("Invalid font {}: {}", path.display(), e)))?;
        Ok(self.with_font(font, font_size))
    }

    /// Rotate a still for display and draw its detections.
    ///
    /// `result` is in the stored pixel space; boxes are mapped through the
    /// same rotation as the pixels.
    pub fn render_still(&self, still: &Still, result: &FrameResult) -> MediaResult<RgbImage> {
        let (w, h) = still.pixels.dimensions();
        let base = rotate_image(&still.pixels, still.rotation);
        self.render(base, &result.rotated(still.rotation, w, h))
    }

    fn tab_size(&self, caption: &str) -> (u32, u32) {
        let height = (self.font_size * 1.2).ceil() as u32;
        let width = match &self.font {
            Some(font) => text_size(PxScale::from(self.font_size), font, caption).0 + 4,
            None => (caption.chars().count() as f32 * self.font_size * 0.55).ceil() as u32,
        };
        (width, height)
    }

    fn draw_detection(&self, mut image: RgbImage, detection: &Detection) -> MediaResult<RgbImage> {
        if !detection.bbox.is_valid() {
            return Err(MediaError::composite_failed(format!(
                "Invalid box for {}: {:?}",
                detection.label, detection.bbox
            )));
        }

        let (img_w, img_h) = image.dimensions();
        let bbox = detection.bbox.clamp(img_w, img_h);
        let x1 = bbox.x1.floor() as i32;
        let y1 = bbox.y1.floor() as i32;
        let x2 = (bbox.x2.ceil() as i32).min(img_w as i32);
        let y2 = (bbox.y2.ceil() as i32).min(img_h as i32);
        if x2 <= x1 || y2 <= y1 {
            return Ok(image);
        }

        let color = class_color(detection.class_id);

        for t in 0..BOX_THICKNESS {
            let (w, h) = (x2 - x1 - 2 * t, y2 - y1 - 2 * t);
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(&mut image, Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32), color);
        }

        let caption = detection.caption();
        let (tab_w, tab_h) = self.tab_size(&caption);
        let tab_w = tab_w.min(img_w - x1 as u32);
        let tab_h = tab_h.min(img_h);
        if tab_w == 0 || tab_h == 0 {
            return Ok(image);
        }

        // Above the box, or inside its top edge when there is no room.
        let tab_y = if y1 >= tab_h as i32 { y1 - tab_h as i32 } else { y1 };
        draw_filled_rect_mut(&mut image, Rect::at(x1, tab_y).of_size(tab_w, tab_h), color);

        if let Some(font) = &self.font {
            draw_text_mut(
                &mut image,
                TEXT_COLOR,
                x1 + 2,
                tab_y,
                PxScale::from(self.font_size),
                font,
                &caption,
            );
        }

        Ok(image)
    }
}

impl FrameRenderer for Compositor {
    fn render(&self, frame: RgbImage, result: &FrameResult) -> MediaResult<RgbImage> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(MediaError::composite_failed("Empty frame"));
        }
        result
            .iter()
            .try_fold(frame, |image, detection| self.draw_detection(image, detection))
    }
}
