//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use mdetect_media::{FailurePolicy, StorageLayout};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Per-IP requests per second on prediction routes
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Model, upload and result roots
    pub layout: StorageLayout,
    /// Weight-file extension for the models directory scan
    pub model_extension: String,
    /// Explicit manifest; overrides the scan when set
    pub model_manifest: Option<PathBuf>,
    /// Threshold applied to every model on `/predict/video`
    pub video_confidence_threshold: f32,
    pub default_max_frames: u64,
    pub frame_failure_policy: FailurePolicy,
    pub label_font_path: Option<PathBuf>,
    pub save_labels: bool,
    pub save_confidence: bool,
    pub max_concurrent_video_jobs: usize,
    pub hls_segment_seconds: u32,
    pub transcode_timeout: Duration,
    pub artifact_ttl: Duration,
    pub janitor_interval: Duration,
    pub enable_artifact_janitor: bool,
    pub metrics_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 512 * 1024 * 1024, // 512MB
            environment: "development".to_string(),
            layout: StorageLayout::new("models", "uploads", "results"),
            model_extension: "onnx".to_string(),
            model_manifest: None,
            video_confidence_threshold: 0.5,
            default_max_frames: 100,
            frame_failure_policy: FailurePolicy::DropFrame,
            label_font_path: None,
            save_labels: false,
            save_confidence: false,
            max_concurrent_video_jobs: 2,
            hls_segment_seconds: 4,
            transcode_timeout: Duration::from_secs(1800),
            artifact_ttl: Duration::from_secs(86_400),
            janitor_interval: Duration::from_secs(600),
            enable_artifact_janitor: true,
            metrics_enabled: true,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

impl AppConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let layout = StorageLayout::new(
            env_path("MODELS_DIR").unwrap_or(defaults.layout.models_dir),
            env_path("UPLOADS_DIR").unwrap_or(defaults.layout.uploads_dir),
            env_path("RESULTS_DIR").unwrap_or(defaults.layout.results_dir),
        );

        let frame_failure_policy = match std::env::var("FRAME_FAILURE_POLICY") {
            Ok(v) => v.parse().unwrap_or_else(|e: String| {
                tracing::warn!("{}, using {}", e, defaults.frame_failure_policy);
                defaults.frame_failure_policy
            }),
            Err(_) => defaults.frame_failure_policy,
        };

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_or("API_PORT", defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_or("RATE_LIMIT_RPS", defaults.rate_limit_rps),
            max_body_size: env_or("MAX_BODY_SIZE", defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            layout,
            model_extension: std::env::var("MODEL_EXTENSION").unwrap_or(defaults.model_extension),
            model_manifest: env_path("MODEL_MANIFEST"),
            video_confidence_threshold: env_or("VIDEO_CONFIDENCE_THRESHOLD", defaults.video_confidence_threshold),
            default_max_frames: env_or("DEFAULT_MAX_FRAMES", defaults.default_max_frames),
            frame_failure_policy,
            label_font_path: env_path("LABEL_FONT_PATH"),
            save_labels: env_flag("SAVE_LABELS", defaults.save_labels),
            save_confidence: env_flag("SAVE_CONFIDENCE", defaults.save_confidence),
            max_concurrent_video_jobs: env_or("MAX_CONCURRENT_VIDEO_JOBS", defaults.max_concurrent_video_jobs).max(1),
            hls_segment_seconds: env_or("HLS_SEGMENT_SECONDS", defaults.hls_segment_seconds),
            transcode_timeout: Duration::from_secs(env_or("TRANSCODE_TIMEOUT_SECS", 1800)),
            artifact_ttl: Duration::from_secs(env_or("ARTIFACT_TTL_SECS", 86_400)),
            janitor_interval: Duration::from_secs(env_or("JANITOR_INTERVAL_SECS", 600).max(1)),
            enable_artifact_janitor: env_flag("ENABLE_ARTIFACT_JANITOR", defaults.enable_artifact_janitor),
            metrics_enabled: env_flag("METRICS_ENABLED", defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Check values that would make the service misbehave.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.video_confidence_threshold) {
            return Err(format!(
                "VIDEO_CONFIDENCE_THRESHOLD must be within [0, 1], got {}",
                self.video_confidence_threshold
            ));
        }
        if self.model_extension.trim_start_matches('.').is_empty() {
            return Err("MODEL_EXTENSION must not be empty".to_string());
        }
        if self.hls_segment_seconds == 0 {
            return Err("HLS_SEGMENT_SECONDS must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.default_max_frames, 100);
        assert_eq!(config.frame_failure_policy, FailurePolicy::DropFrame);
        assert!((config.video_confidence_threshold - 0.5).abs() < f32::EPSILON);
        assert!(!config.is_production());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = AppConfig {
            video_confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_helpers_fall_back() {
        assert_eq!(env_or("MDETECT_TEST_UNSET_NUMBER", 7u32), 7);
        assert!(env_flag("MDETECT_TEST_UNSET_FLAG", true));
        assert!(env_path("MDETECT_TEST_UNSET_PATH").is_none());
    }
}
