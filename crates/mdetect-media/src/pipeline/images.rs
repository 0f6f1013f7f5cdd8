//! Batch image pipeline.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use mdetect_models::{FileFailure, FrameResult};
use tracing::{info, warn};

use crate::compositor::{read_still, Compositor};
use crate::detection::Ensemble;
use crate::error::{MediaError, MediaResult};
use crate::metrics;

/// Subfolder of the output directory holding label sidecars.
pub const LABELS_DIR: &str = "labels";

/// YOLO-format label sidecar options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelExport {
    pub enabled: bool,
    /// Append the confidence as a sixth column
    pub with_confidence: bool,
}

/// Per-batch outcome.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: Vec<FileFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs detection and compositing over every file of a directory.
#[derive(Clone, Default)]
pub struct ImagePipeline {
    compositor: Compositor,
    labels: LabelExport,
}

impl ImagePipeline {
    pub fn new(compositor: Compositor) -> Self {
        Self {
            compositor,
            labels: LabelExport::default(),
        }
    }

    pub fn with_labels(mut self, labels: LabelExport) -> Self {
        self.labels = labels;
        self
    }

    /// Process every regular file in `input_dir`, writing annotated copies
    /// under the same names in `output_dir`.
    ///
    /// Failures are recorded per file and the batch continues. Only a failure
    /// to list the input or create the output directory is returned as an
    /// error. Dot-files (in-flight uploads) are skipped.
    pub fn run(&self, ensemble: &Ensemble, input_dir: &Path, output_dir: &Path) -> MediaResult<BatchReport> {
        std::fs::create_dir_all(output_dir)?;

        let files = list_files(input_dir)?;
        let total = files.len();
        let mut report = BatchReport::default();

        for (index, path) in files.iter().enumerate() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            match self.process_file(ensemble, path, output_dir) {
                Ok(count) => {
                    report.processed += 1;
                    metrics::record_image(true);
                    info!(file = %name, detections = count, "Processed image {}/{}", index + 1, total);
                }
                Err(e) => {
                    metrics::record_image(false);
                    warn!(file = %name, error = %e, "Image failed {}/{}", index + 1, total);
                    report.failed.push(FileFailure {
                        file: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Annotate one file; returns the number of detections drawn.
    pub fn process_file(&self, ensemble: &Ensemble, path: &Path, output_dir: &Path) -> MediaResult<usize> {
        let file_name = path
            .file_name()
            .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))?;

        let still = read_still(path)?;
        let result = ensemble.run(&still.pixels)?;
        let annotated = self.compositor.render_still(&still, &result)?;

        annotated.save(output_dir.join(file_name))?;

        if self.labels.enabled {
            let (w, h) = still.pixels.dimensions();
            let stem = path.file_stem().unwrap_or(file_name).to_string_lossy();
            let labels_dir = output_dir.join(LABELS_DIR);
            std::fs::create_dir_all(&labels_dir)?;
            std::fs::write(
                labels_dir.join(format!("{}.txt", stem)),
                label_lines(&result, w, h, self.labels.with_confidence),
            )?;
        }

        Ok(result.len())
    }
}

fn list_files(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// One `class cx cy w h [conf]` line per detection, normalized to the
/// stored image size.
fn label_lines(result: &FrameResult, width: u32, height: u32, with_confidence: bool) -> String {
    let mut out = String::new();
    for detection in result.iter() {
        let (cx, cy, w, h) = detection.bbox.to_normalized_center(width, height);
        let _ = write!(out, "{} {:.6} {:.6} {:.6} {:.6}", detection.class_id, cx, cy, w, h);
        if with_confidence {
            let _ = write!(out, " {:.6}", detection.confidence);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::class_color;
    use crate::compositor::tests::jpeg_with_orientation;
    use crate::detection::ensemble::tests::{member, FailingDetector, ScoredDetector};
    use crate::detection::Detector;
    use image::{Rgb, RgbImage};
    use mdetect_models::{BoundingBox, Detection};

    fn scored(scores: &[f32]) -> ScoredDetector {
        ScoredDetector {
            name: "fish".to_string(),
            scores: scores.to_vec(),
        }
    }

    /// Reports one class-3 box at a fixed stored-pixel position.
    struct FixedBox;

    impl Detector for FixedBox {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _image: &RgbImage, _threshold: f32) -> MediaResult<Vec<Detection>> {
            Ok(vec![Detection::new(BoundingBox::new(64.0, 16.0, 80.0, 32.0), 3, "ray", 0.9)])
        }
    }

    fn write_png(dir: &Path, name: &str) {
        RgbImage::from_pixel(32, 32, Rgb([0, 80, 160])).save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_run_isolates_bad_files() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(input.path(), "a.png");
        write_png(input.path(), "b.png");
        std::fs::write(input.path().join("notes.txt"), b"not an image").unwrap();
        std::fs::write(input.path().join(".c.png.part"), b"partial").unwrap();

        let ensemble = Ensemble::new(vec![member(scored(&[0.9, 0.8]), 0.5)]);
        let report = ImagePipeline::default()
            .run(&ensemble, input.path(), output.path())
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file, "notes.txt");
        assert!(output.path().join("a.png").exists());
        assert!(output.path().join("b.png").exists());
        assert!(!output.path().join("notes.txt").exists());
    }

    #[test]
    fn test_exif_orientation_rotates_output_and_boxes() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        // 96x48 stored: dark left half, white right half.
        let stored = RgbImage::from_fn(96, 48, |x, _| if x >= 48 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) });
        // JPEG payloads under .png names keep the annotated output lossless.
        for tag in [3u16, 6, 8] {
            std::fs::write(input.path().join(format!("orient_{}.png", tag)), jpeg_with_orientation(&stored, tag)).unwrap();
        }

        let report = ImagePipeline::default()
            .run(&Ensemble::new(vec![member(FixedBox, 0.5)]), input.path(), output.path())
            .unwrap();
        assert_eq!(report.processed, 3);

        let open = |tag: u16| image::open(output.path().join(format!("orient_{}.png", tag))).unwrap().to_rgb8();
        let is_white = |p: &Rgb<u8>| p.0.iter().all(|c| *c > 200);
        let is_dark = |p: &Rgb<u8>| p.0.iter().all(|c| *c < 60);
        let color = class_color(3);

        // 90 clockwise: white half at the bottom, box at (16, 64)-(32, 80).
        let out = open(6);
        assert_eq!(out.dimensions(), (48, 96));
        assert!(is_white(out.get_pixel(24, 90)));
        assert!(is_dark(out.get_pixel(24, 20)));
        assert_eq!(*out.get_pixel(24, 79), color);
        assert_eq!(*out.get_pixel(16, 72), color);

        // 180: white half on the left, box at (16, 16)-(32, 32).
        let out = open(3);
        assert_eq!(out.dimensions(), (96, 48));
        assert!(is_white(out.get_pixel(8, 40)));
        assert!(is_dark(out.get_pixel(80, 40)));
        assert_eq!(*out.get_pixel(24, 31), color);

        // 270 clockwise: white half on top, box at (16, 16)-(32, 32).
        let out = open(8);
        assert_eq!(out.dimensions(), (48, 96));
        assert!(is_white(out.get_pixel(8, 40)));
        assert!(is_dark(out.get_pixel(24, 80)));
        assert_eq!(*out.get_pixel(24, 31), color);
    }

    #[test]
    fn test_detector_failure_fails_only_that_file() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(input.path(), "a.png");
        write_png(input.path(), "b.png");

        let ensemble = Ensemble::new(vec![member(FailingDetector, 0.5)]);
        let report = ImagePipeline::default()
            .run(&ensemble, input.path(), output.path())
            .unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_empty_ensemble_copies_images() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(input.path(), "a.png");

        let report = ImagePipeline::default()
            .run(&Ensemble::default(), input.path(), output.path())
            .unwrap();

        assert!(report.is_clean());
        let out = image::open(output.path().join("a.png")).unwrap().to_rgb8();
        assert_eq!(*out.get_pixel(10, 10), Rgb([0, 80, 160]));
    }

    #[test]
    fn test_label_sidecars() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(input.path(), "reef.png");

        let ensemble = Ensemble::new(vec![member(scored(&[0.9, 0.3]), 0.5)]);
        ImagePipeline::default()
            .with_labels(LabelExport {
                enabled: true,
                with_confidence: true,
            })
            .run(&ensemble, input.path(), output.path())
            .unwrap();

        let labels = std::fs::read_to_string(output.path().join("labels").join("reef.txt")).unwrap();
        let lines: Vec<_> = labels.lines().collect();
        assert_eq!(lines.len(), 1);
        // box (0,0)-(2,2) on a 32x32 image
        assert_eq!(lines[0], "0 0.031250 0.031250 0.062500 0.062500 0.900000");
    }

    #[test]
    fn test_missing_input_dir_is_an_error() {
        let output = tempfile::tempdir().unwrap();
        let missing = output.path().join("missing");
        assert!(ImagePipeline::default()
            .run(&Ensemble::default(), &missing, output.path())
            .is_err());
    }
}
