//! Detector ensembles and the per-frame detection runner.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::RgbImage;
use mdetect_models::FrameResult;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Detector, DetectorCache, ModelManifest};
use crate::error::{MediaError, MediaResult};
use crate::metrics;

/// What the video pipeline does when a detector fails on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the whole frame from the output.
    #[default]
    DropFrame,
    /// Keep the frame; the failing detector contributes nothing.
    SkipDetector,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop_frame" | "drop-frame" => Ok(Self::DropFrame),
            "skip_detector" | "skip-detector" => Ok(Self::SkipDetector),
            other => Err(format!("Unknown failure policy: {}", other)),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropFrame => write!(f, "drop_frame"),
            Self::SkipDetector => write!(f, "skip_detector"),
        }
    }
}

/// A detector paired with its confidence threshold.
#[derive(Clone)]
pub struct EnsembleMember {
    pub detector: Arc<dyn Detector>,
    pub confidence_threshold: f32,
}

/// Outcome of a fault-isolated run.
#[derive(Debug, Clone, Default)]
pub struct IsolatedRun {
    pub result: FrameResult,
    /// Number of detectors that failed on this frame
    pub failures: usize,
}

/// Ordered set of detectors applied jointly to the same input.
#[derive(Clone, Default)]
pub struct Ensemble {
    members: Vec<EnsembleMember>,
}

impl Ensemble {
    pub fn new(members: Vec<EnsembleMember>) -> Self {
        Self { members }
    }

    /// Pair `thresholds[i]` with the i-th manifest model.
    ///
    /// Counts must match and every threshold must lie in [0, 1]. Any model
    /// that fails to load fails the whole ensemble.
    pub fn load(
        manifest: &ModelManifest,
        thresholds: &[f32],
        cache: &DetectorCache,
    ) -> MediaResult<Self> {
        if thresholds.len() != manifest.len() {
            return Err(MediaError::ThresholdMismatch {
                models: manifest.len(),
                thresholds: thresholds.len(),
            });
        }

        if let Some(bad) = thresholds.iter().find(|t| !(0.0..=1.0).contains(*t)) {
            return Err(MediaError::InvalidThreshold(*bad));
        }

        let members = manifest
            .models()
            .iter()
            .zip(thresholds)
            .map(|(spec, &confidence_threshold)| {
                Ok(EnsembleMember {
                    detector: cache.get_or_load(&spec.path)?,
                    confidence_threshold,
                })
            })
            .collect::<MediaResult<Vec<_>>>()?;

        Ok(Self { members })
    }

    /// Use the same threshold for every model.
    pub fn uniform(manifest: &ModelManifest, threshold: f32, cache: &DetectorCache) -> MediaResult<Self> {
        Self::load(manifest, &vec![threshold; manifest.len()], cache)
    }

    /// Use each model's manifest threshold.
    pub fn from_manifest_defaults(manifest: &ModelManifest, cache: &DetectorCache) -> MediaResult<Self> {
        Self::load(manifest, &manifest.default_thresholds(), cache)
    }

    /// Run every detector in order and concatenate their detections.
    ///
    /// The first detector error aborts the frame.
    pub fn run(&self, image: &RgbImage) -> MediaResult<FrameResult> {
        let mut result = FrameResult::new();
        for member in &self.members {
            let detections = member
                .detector
                .detect(image, member.confidence_threshold)
                .map_err(|e| {
                    metrics::record_detector_failure(member.detector.name());
                    e
                })?;
            result.extend(detections);
        }
        Ok(result)
    }

    /// Run every detector; a failing detector contributes nothing and the
    /// rest still run.
    pub fn run_isolated(&self, image: &RgbImage) -> IsolatedRun {
        let mut run = IsolatedRun::default();
        for member in &self.members {
            match member.detector.detect(image, member.confidence_threshold) {
                Ok(detections) => run.result.extend(detections),
                Err(e) => {
                    warn!(model = %member.detector.name(), error = %e, "Detector failed, skipping its output");
                    metrics::record_detector_failure(member.detector.name());
                    run.failures += 1;
                }
            }
        }
        run
    }

    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detection::DetectorLoader;
    use mdetect_models::{BoundingBox, Detection, ModelSpec};
    use std::path::Path;

    /// Reports one detection per score at or above the threshold.
    pub(crate) struct ScoredDetector {
        pub name: String,
        pub scores: Vec<f32>,
    }

    impl Detector for ScoredDetector {
        fn name(&self) -> &str {
            &self.name
        }

        fn detect(&self, _image: &RgbImage, threshold: f32) -> MediaResult<Vec<Detection>> {
            Ok(self
                .scores
                .iter()
                .filter(|s| **s >= threshold)
                .enumerate()
                .map(|(i, s)| {
                    let x = i as f32 * 4.0;
                    Detection::new(BoundingBox::new(x, 0.0, x + 2.0, 2.0), i, &self.name, *s)
                })
                .collect())
        }
    }

    pub(crate) struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &str {
            "broken"
        }

        fn detect(&self, _image: &RgbImage, _threshold: f32) -> MediaResult<Vec<Detection>> {
            Err(MediaError::detection_failed("inference exploded"))
        }
    }

    pub(crate) fn member(detector: impl Detector + 'static, threshold: f32) -> EnsembleMember {
        EnsembleMember {
            detector: Arc::new(detector),
            confidence_threshold: threshold,
        }
    }

    fn scored(name: &str, scores: &[f32]) -> ScoredDetector {
        ScoredDetector {
            name: name.to_string(),
            scores: scores.to_vec(),
        }
    }

    /// Builds scored detectors from file names; `broken*` files fail to load.
    struct StubLoader;

    impl DetectorLoader for StubLoader {
        fn load(&self, path: &Path) -> MediaResult<Arc<dyn Detector>> {
            let name = path.file_stem().unwrap().to_string_lossy().to_string();
            if name.starts_with("broken") {
                return Err(MediaError::internal("corrupt weights"));
            }
            Ok(Arc::new(scored(&name, &[0.9, 0.6, 0.3])))
        }
    }

    fn manifest_in(dir: &Path, names: &[&str]) -> ModelManifest {
        ModelManifest::new(
            names
                .iter()
                .map(|n| {
                    let path = dir.join(format!("{}.onnx", n));
                    std::fs::write(&path, b"weights").unwrap();
                    ModelSpec::from_path(path)
                })
                .collect(),
        )
    }

    #[test]
    fn test_output_is_sum_of_member_counts() {
        let image = RgbImage::new(8, 8);
        let cases: Vec<(Vec<Vec<f32>>, Vec<f32>)> = vec![
            (vec![vec![0.9, 0.2]], vec![0.5]),
            (vec![vec![0.9, 0.6, 0.3], vec![0.4, 0.45]], vec![0.5, 0.4]),
            (vec![vec![0.1], vec![0.99, 0.98], vec![0.7, 0.7, 0.7]], vec![0.0, 0.5, 0.8]),
        ];

        for (scores, thresholds) in cases {
            let expected: usize = scores
                .iter()
                .zip(&thresholds)
                .map(|(s, t)| s.iter().filter(|v| *v >= t).count())
                .sum();

            let ensemble = Ensemble::new(
                scores
                    .iter()
                    .zip(&thresholds)
                    .enumerate()
                    .map(|(i, (s, t))| member(scored(&format!("m{}", i), s), *t))
                    .collect(),
            );

            let result = ensemble.run(&image).unwrap();
            assert_eq!(result.len(), expected);
        }
    }

    #[test]
    fn test_run_preserves_ensemble_order() {
        let ensemble = Ensemble::new(vec![
            member(scored("megafauna", &[0.9]), 0.5),
            member(scored("fish", &[0.9, 0.8]), 0.5),
        ]);
        let result = ensemble.run(&RgbImage::new(8, 8)).unwrap();
        let labels: Vec<_> = result.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["megafauna", "fish", "fish"]);
    }

    #[test]
    fn test_empty_ensemble_yields_empty_result() {
        let ensemble = Ensemble::default();
        assert!(ensemble.run(&RgbImage::new(4, 4)).unwrap().is_empty());
        assert!(ensemble.run_isolated(&RgbImage::new(4, 4)).result.is_empty());
    }

    #[test]
    fn test_run_fails_fast() {
        let ensemble = Ensemble::new(vec![
            member(scored("a", &[0.9]), 0.5),
            member(FailingDetector, 0.5),
        ]);
        assert!(ensemble.run(&RgbImage::new(4, 4)).is_err());
    }

    #[test]
    fn test_run_isolated_skips_only_failing_detector() {
        let ensemble = Ensemble::new(vec![
            member(scored("a", &[0.9]), 0.5),
            member(FailingDetector, 0.5),
            member(scored("b", &[0.9, 0.7]), 0.5),
        ]);
        let run = ensemble.run_isolated(&RgbImage::new(4, 4));
        assert_eq!(run.failures, 1);
        assert_eq!(run.result.len(), 3);
    }

    #[test]
    fn test_load_pairs_thresholds_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_in(dir.path(), &["a", "b"]);
        let cache = DetectorCache::new(Arc::new(StubLoader));

        let ensemble = Ensemble::load(&manifest, &[0.5, 0.95], &cache).unwrap();
        assert_eq!(ensemble.len(), 2);
        assert_eq!(ensemble.members()[0].detector.name(), "a");
        assert!((ensemble.members()[1].confidence_threshold - 0.95).abs() < f32::EPSILON);

        // a: 0.9, 0.6 pass 0.5; b: nothing passes 0.95
        assert_eq!(ensemble.run(&RgbImage::new(4, 4)).unwrap().len(), 2);
    }

    #[test]
    fn test_load_threshold_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_in(dir.path(), &["a", "b", "c"]);
        let cache = DetectorCache::new(Arc::new(StubLoader));

        let err = Ensemble::load(&manifest, &[0.5, 0.5], &cache).err().unwrap();
        assert!(matches!(err, MediaError::ThresholdMismatch { models: 3, thresholds: 2 }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_load_rejects_out_of_range_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_in(dir.path(), &["a"]);
        let cache = DetectorCache::new(Arc::new(StubLoader));

        assert!(matches!(
            Ensemble::load(&manifest, &[1.2], &cache),
            Err(MediaError::InvalidThreshold(_))
        ));
        assert!(Ensemble::load(&manifest, &[f32::NAN], &cache).is_err());
    }

    #[test]
    fn test_one_bad_model_fails_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_in(dir.path(), &["a", "broken"]);
        let cache = DetectorCache::new(Arc::new(StubLoader));

        assert!(Ensemble::uniform(&manifest, 0.5, &cache).is_err());
    }

    #[test]
    fn test_empty_manifest_loads_empty_ensemble() {
        let cache = DetectorCache::new(Arc::new(StubLoader));
        let ensemble = Ensemble::load(&ModelManifest::default(), &[], &cache).unwrap();
        assert!(ensemble.is_empty());
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("drop_frame".parse::<FailurePolicy>().unwrap(), FailurePolicy::DropFrame);
        assert_eq!("Skip-Detector".parse::<FailurePolicy>().unwrap(), FailurePolicy::SkipDetector);
        assert!("retry".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::default().to_string(), "drop_frame");
    }
}
