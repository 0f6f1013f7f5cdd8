//! Model manifest entries.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Threshold used when a manifest entry does not specify one.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

fn default_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

/// One model in the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelSpec {
    /// Display name (defaults to the file stem)
    pub name: String,
    /// Weight file location
    pub path: PathBuf,
    /// Default confidence threshold
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl ModelSpec {
    /// Create an entry named after the file stem.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            name,
            path,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    /// Validate the entry.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if self.path.as_os_str().is_empty() {
            return Err(format!("Model '{}' has no path", self.name));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!(
                "Model '{}' threshold {} is outside [0, 1]",
                self.name, self.threshold
            ));
        }
        Ok(())
    }
}

/// On-disk JSON manifest: `{"models": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ManifestFile {
    pub models: Vec<ModelSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        let spec = ModelSpec::from_path("models/fish_invertebrates.onnx");
        assert_eq!(spec.name, "fish_invertebrates");
        assert!((spec.threshold - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_deserialize_default_threshold() {
        let file: ManifestFile = serde_json::from_str(
            r#"{"models": [{"name": "megafauna", "path": "megafauna.onnx"},
                           {"name": "fish", "path": "fish.onnx", "threshold": 0.3}]}"#,
        )
        .unwrap();
        assert_eq!(file.models.len(), 2);
        assert!((file.models[0].threshold - 0.5).abs() < f32::EPSILON);
        assert!((file.models[1].threshold - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate() {
        let mut spec = ModelSpec::from_path("a.onnx");
        assert!(spec.validate().is_ok());

        spec.threshold = 1.5;
        assert!(spec.validate().is_err());

        spec.threshold = 0.2;
        spec.name = " ".to_string();
        assert!(spec.validate().is_err());
    }
}
