//! Model manifest: which weight files make up the ensemble, in which order.

use std::path::Path;

use mdetect_models::{ManifestFile, ModelSpec};
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};

/// Ordered list of models, resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelManifest {
    models: Vec<ModelSpec>,
}

impl ModelManifest {
    pub fn new(models: Vec<ModelSpec>) -> Self {
        Self { models }
    }

    /// Resolve from an explicit manifest file if given, else scan `models_dir`.
    pub fn resolve(
        models_dir: &Path,
        extension: &str,
        manifest_path: Option<&Path>,
    ) -> MediaResult<Self> {
        let manifest = match manifest_path {
            Some(path) => Self::from_file(path)?,
            None => Self::scan(models_dir, extension)?,
        };

        info!(
            models = manifest.len(),
            names = ?manifest.models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "Model manifest resolved"
        );

        Ok(manifest)
    }

    /// Discover weight files with the given extension, sorted by file name.
    ///
    /// A missing directory yields an empty manifest.
    pub fn scan(dir: &Path, extension: &str) -> MediaResult<Self> {
        let extension = extension.trim_start_matches('.');

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %dir.display(), "Models directory does not exist");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let matches = path
                .extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            if matches && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        Ok(Self {
            models: paths.into_iter().map(ModelSpec::from_path).collect(),
        })
    }

    /// Load a JSON manifest. Relative model paths resolve against the
    /// manifest's directory.
    pub fn from_file(path: &Path) -> MediaResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MediaError::InvalidManifest(format!("{}: {}", path.display(), e)))?;
        let file: ManifestFile = serde_json::from_str(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut models = Vec::with_capacity(file.models.len());
        for mut spec in file.models {
            spec.validate().map_err(MediaError::InvalidManifest)?;
            if spec.path.is_relative() {
                spec.path = base.join(&spec.path);
            }
            models.push(spec);
        }

        Ok(Self { models })
    }

    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }

    /// Per-model default thresholds, in manifest order.
    pub fn default_thresholds(&self) -> Vec<f32> {
        self.models.iter().map(|m| m.threshold).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["megafauna.onnx", "fish.ONNX", "notes.txt", "legacy.pt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.onnx")).unwrap();

        let manifest = ModelManifest::scan(dir.path(), "onnx").unwrap();
        let names: Vec<_> = manifest.models().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["fish", "megafauna"]);
    }

    #[test]
    fn test_scan_empty_and_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelManifest::scan(dir.path(), "onnx").unwrap().is_empty());
        assert!(ModelManifest::scan(&dir.path().join("missing"), ".onnx")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{"models": [
                {"name": "megafauna", "path": "weights/megafauna.onnx", "threshold": 0.4},
                {"name": "fish", "path": "/opt/models/fish.onnx"}
            ]}"#,
        )
        .unwrap();

        let manifest = ModelManifest::from_file(&path).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.models()[0].path, dir.path().join("weights/megafauna.onnx"));
        assert_eq!(manifest.models()[1].path, Path::new("/opt/models/fish.onnx"));
        assert_eq!(manifest.default_thresholds(), vec![0.4, 0.5]);
    }

    #[test]
    fn test_from_file_rejects_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"models": [{"name": "a", "path": "a.onnx", "threshold": 2.0}]}"#)
            .unwrap();

        assert!(matches!(
            ModelManifest::from_file(&path),
            Err(MediaError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_resolve_prefers_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scanned.onnx"), b"x").unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"models": []}"#).unwrap();

        assert!(ModelManifest::resolve(dir.path(), "onnx", Some(&path))
            .unwrap()
            .is_empty());
        assert_eq!(ModelManifest::resolve(dir.path(), "onnx", None).unwrap().len(), 1);
    }
}
