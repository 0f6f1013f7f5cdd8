//! YOLO object detection using ONNX Runtime.
//!
//! Expects the single-output export produced by YOLOv8-style models:
//! `[1, 4 + classes, candidates]`, boxes in center format at the model's
//! input resolution followed by one score per class.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use image::{imageops::FilterType, RgbImage};
use mdetect_models::{BoundingBox, Detection};
use ndarray::ArrayView2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use super::{Detector, DetectorLoader};
use crate::error::{MediaError, MediaResult};

/// Configuration for YOLO inference.
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            nms_threshold: 0.7,
            input_size: 640,
        }
    }
}

/// Object detector backed by an ONNX Runtime session.
pub struct YoloDetector {
    name: String,
    session: Mutex<Session>,
    class_names: HashMap<usize, String>,
    config: YoloConfig,
}

impl YoloDetector {
    /// Load a detector from an ONNX weight file.
    ///
    /// Returns error if the model file doesn't exist or cannot be loaded.
    pub fn load(path: &Path, config: YoloConfig) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::model_not_found(path.display().to_string()));
        }

        let session = create_session(path)?;
        let class_names = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names"))
            .map(|raw| parse_class_names(&raw))
            .unwrap_or_default();

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "model".to_string());

        info!(
            model = %name,
            classes = class_names.len(),
            input_size = config.input_size,
            "Detector initialized"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            class_names,
            config,
        })
    }

    /// Preprocess image for YOLO inference.
    ///
    /// - Resize to model input size
    /// - Normalize pixel values to [0, 1]
    /// - Convert to NCHW format (batch, channels, height, width)
    fn preprocess(&self, img: &RgbImage) -> MediaResult<Value> {
        let input_size = self.config.input_size;
        let resized = image::imageops::resize(img, input_size, input_size, FilterType::Triangle);
        let (w, h) = (input_size as usize, input_size as usize);

        let mut chw_data: Vec<f32> = vec![0.0; 3 * h * w];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let idx = y as usize * w + x as usize;
            for c in 0..3 {
                chw_data[c * h * w + idx] = pixel[c] as f32 / 255.0;
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))
    }

    /// Run ONNX inference, returning the output shape and data.
    fn run_inference(&self, input: Value) -> MediaResult<(Vec<usize>, Vec<f32>)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection_failed("Missing output0 tensor"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        let shape = shape.iter().map(|d| (*d).max(0) as usize).collect();
        Ok((shape, data.to_vec()))
    }

    fn label_for(&self, class_id: usize) -> String {
        self.class_names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl Detector for YoloDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, image: &RgbImage, confidence_threshold: f32) -> MediaResult<Vec<Detection>> {
        let input = self.preprocess(image)?;
        let (shape, outputs) = self.run_inference(input)?;

        let candidates = decode_predictions(
            &outputs,
            &shape,
            self.config.input_size,
            image.width(),
            image.height(),
            confidence_threshold,
        )?;
        let kept = non_maximum_suppression(candidates, self.config.nms_threshold);

        debug!(model = %self.name, count = kept.len(), "Detection completed");

        Ok(kept
            .into_iter()
            .map(|c| Detection::new(c.bbox, c.class_id, self.label_for(c.class_id), c.confidence))
            .collect())
    }
}

/// Loads [`YoloDetector`]s with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct YoloLoader {
    config: YoloConfig,
}

impl YoloLoader {
    pub fn new(config: YoloConfig) -> Self {
        Self { config }
    }
}

impl DetectorLoader for YoloLoader {
    fn load(&self, path: &Path) -> MediaResult<Arc<dyn Detector>> {
        Ok(Arc::new(YoloDetector::load(path, self.config.clone())?))
    }
}

/// A thresholded, unsuppressed detection candidate.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    bbox: BoundingBox,
    class_id: usize,
    confidence: f32,
}

/// Decode a `[1, 4 + classes, candidates]` output into pixel-space candidates.
fn decode_predictions(
    outputs: &[f32],
    shape: &[usize],
    input_size: u32,
    orig_width: u32,
    orig_height: u32,
    confidence_threshold: f32,
) -> MediaResult<Vec<Candidate>> {
    let (num_features, num_boxes) = match shape {
        [1, features, boxes] | [features, boxes] => (*features, *boxes),
        _ => {
            return Err(MediaError::detection_failed(format!(
                "Unexpected output shape {:?}",
                shape
            )))
        }
    };

    if num_features <= 4 || outputs.len() != num_features * num_boxes {
        return Err(MediaError::detection_failed(format!(
            "Output of {} values does not match shape {:?}",
            outputs.len(),
            shape
        )));
    }

    let output = ArrayView2::from_shape((num_features, num_boxes), outputs)
        .map_err(|e| MediaError::detection_failed(format!("Failed to reshape output: {}", e)))?;

    let scale_w = orig_width as f32 / input_size as f32;
    let scale_h = orig_height as f32 / input_size as f32;

    let mut candidates = Vec::new();
    for i in 0..num_boxes {
        let column = output.column(i);

        let (best_class, best_score) = column
            .iter()
            .skip(4)
            .enumerate()
            .fold((0usize, f32::MIN), |best, (c, &score)| {
                if score > best.1 {
                    (c, score)
                } else {
                    best
                }
            });

        if best_score < confidence_threshold {
            continue;
        }

        let bbox = BoundingBox::from_center(
            column[0] * scale_w,
            column[1] * scale_h,
            column[2] * scale_w,
            column[3] * scale_h,
        )
        .clamp(orig_width, orig_height);

        candidates.push(Candidate {
            bbox,
            class_id: best_class,
            confidence: best_score,
        });
    }

    Ok(candidates)
}

/// Per-class non-maximum suppression.
fn non_maximum_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = keep.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Parse the `names` metadata written by YOLO exporters, e.g.
/// `{0: 'fish', 1: 'sea turtle'}`.
fn parse_class_names(raw: &str) -> HashMap<usize, String> {
    let mut names = HashMap::new();
    let mut rest = raw.trim().trim_start_matches('{').trim_end_matches('}');

    while let Some((key, tail)) = rest.split_once(':') {
        let tail = tail.trim_start();
        let quote = match tail.chars().next() {
            Some(q @ ('\'' | '"')) => q,
            _ => break,
        };
        let body = &tail[1..];
        let Some(end) = body.find(quote) else {
            break;
        };

        if let Ok(id) = key.trim().trim_start_matches(',').trim().parse::<usize>() {
            names.insert(id, body[..end].to_string());
        }
        rest = &body[end + 1..];
    }

    names
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let mut builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::ep::CUDA as CUDAExecutionProvider;
        if let Ok(mut cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::ep::CoreML as CoreMLExecutionProvider;
        if let Ok(mut coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    debug!("Using CPU execution provider for object detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `[1, 4 + classes, boxes]` buffer from per-box rows.
    fn yolo_output(rows: &[Vec<f32>]) -> (Vec<f32>, Vec<usize>) {
        let features = rows[0].len();
        let boxes = rows.len();
        let mut data = vec![0.0; features * boxes];
        for (b, row) in rows.iter().enumerate() {
            for (f, v) in row.iter().enumerate() {
                data[f * boxes + b] = *v;
            }
        }
        (data, vec![1, features, boxes])
    }

    #[test]
    fn test_config_default() {
        let config = YoloConfig::default();
        assert_eq!(config.input_size, 640);
        assert!((config.nms_threshold - 0.7).abs() < 0.001);
    }

    #[test]
    fn test_decode_scales_to_source_image() {
        // One box centered in a 640 input, class 1 wins.
        let (data, shape) = yolo_output(&[vec![320.0, 320.0, 64.0, 32.0, 0.1, 0.9]]);
        let candidates = decode_predictions(&data, &shape, 640, 1280, 320, 0.5).unwrap();

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.class_id, 1);
        assert!((c.confidence - 0.9).abs() < 1e-6);
        // x scaled by 2, y by 0.5
        assert_eq!(c.bbox, BoundingBox::new(576.0, 152.0, 704.0, 168.0));
    }

    #[test]
    fn test_decode_applies_threshold() {
        let (data, shape) = yolo_output(&[
            vec![100.0, 100.0, 10.0, 10.0, 0.30],
            vec![200.0, 200.0, 10.0, 10.0, 0.55],
        ]);
        let candidates = decode_predictions(&data, &shape, 640, 640, 640, 0.5).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].confidence - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let data = vec![0.0; 10];
        assert!(decode_predictions(&data, &[1, 5, 3], 640, 640, 640, 0.5).is_err());
        assert!(decode_predictions(&data, &[10], 640, 640, 640, 0.5).is_err());
    }

    #[test]
    fn test_nms_suppresses_same_class_only() {
        let a = Candidate {
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            class_id: 0,
            confidence: 0.9,
        };
        let b = Candidate {
            bbox: BoundingBox::new(1.0, 0.0, 11.0, 10.0),
            class_id: 0,
            confidence: 0.8,
        };
        let c = Candidate {
            class_id: 1,
            ..b.clone()
        };

        let kept = non_maximum_suppression(vec![b, c, a.clone()], 0.7);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0], a);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn test_parse_class_names() {
        let names = parse_class_names("{0: 'fish', 1: 'sea turtle', 2: \"ray, manta\"}");
        assert_eq!(names.len(), 3);
        assert_eq!(names[&0], "fish");
        assert_eq!(names[&1], "sea turtle");
        assert_eq!(names[&2], "ray, manta");
        assert!(parse_class_names("").is_empty());
    }

    #[test]
    fn test_missing_model_file() {
        let err = YoloDetector::load(Path::new("/nonexistent/model.onnx"), YoloConfig::default());
        assert!(matches!(err, Err(MediaError::ModelNotFound(_))));
    }
}
