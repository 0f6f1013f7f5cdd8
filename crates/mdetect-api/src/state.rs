//! Application state.

use std::sync::Arc;

use mdetect_media::pipeline::images::LabelExport;
use mdetect_media::{
    Compositor, DetectorCache, DetectorLoader, Ensemble, HlsPackager, ImagePipeline, MediaError, MediaResult,
    ModelManifest, StorageLayout, YoloLoader,
};
use tokio::sync::{RwLock, Semaphore};
use tracing::info;

use crate::config::AppConfig;
use crate::services::{ArtifactJanitor, TranscodeService};

/// Label text size when a font is configured.
const LABEL_FONT_SIZE: f32 = 16.0;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub layout: StorageLayout,
    pub manifest: Arc<RwLock<ModelManifest>>,
    pub detectors: Arc<DetectorCache>,
    pub compositor: Compositor,
    /// Admission control for video processing
    pub video_slots: Arc<Semaphore>,
    pub transcodes: TranscodeService,
}

impl AppState {
    /// Create application state with the ONNX YOLO loader.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        Self::with_loader(config, Arc::new(YoloLoader::default()))
    }

    /// Create application state with a custom detector loader.
    pub fn with_loader(config: AppConfig, loader: Arc<dyn DetectorLoader>) -> anyhow::Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;

        let layout = config.layout.clone();
        layout.ensure()?;

        let manifest = resolve_manifest(&config)?;

        let compositor = match &config.label_font_path {
            Some(path) => Compositor::new().with_font_file(path, LABEL_FONT_SIZE)?,
            None => Compositor::new(),
        };

        let packager =
            HlsPackager::new(config.hls_segment_seconds).with_timeout(config.transcode_timeout.as_secs());

        info!(
            models_dir = %layout.models_dir.display(),
            uploads_dir = %layout.uploads_dir.display(),
            results_dir = %layout.results_dir.display(),
            models = manifest.len(),
            "Application state ready"
        );

        Ok(Self {
            video_slots: Arc::new(Semaphore::new(config.max_concurrent_video_jobs)),
            layout,
            manifest: Arc::new(RwLock::new(manifest)),
            detectors: Arc::new(DetectorCache::new(loader)),
            compositor,
            transcodes: TranscodeService::new(packager),
            config,
        })
    }

    /// Ensemble for image requests: explicit thresholds, else the manifest's.
    pub async fn image_ensemble(&self, thresholds: Option<Vec<f32>>) -> MediaResult<Ensemble> {
        self.load_ensemble(move |manifest, cache| match thresholds {
            Some(thresholds) => Ensemble::load(manifest, &thresholds, cache),
            None => Ensemble::from_manifest_defaults(manifest, cache),
        })
        .await
    }

    /// Ensemble for video requests, one fixed threshold for every model.
    pub async fn video_ensemble(&self) -> MediaResult<Ensemble> {
        let threshold = self.config.video_confidence_threshold;
        self.load_ensemble(move |manifest, cache| Ensemble::uniform(manifest, threshold, cache))
            .await
    }

    /// Weight loading is blocking; run it off the async workers.
    async fn load_ensemble<F>(&self, build: F) -> MediaResult<Ensemble>
    where
        F: FnOnce(&ModelManifest, &DetectorCache) -> MediaResult<Ensemble> + Send + 'static,
    {
        let manifest = self.manifest.read().await.clone();
        let detectors = Arc::clone(&self.detectors);
        tokio::task::spawn_blocking(move || build(&manifest, &*detectors))
            .await
            .map_err(|e| MediaError::internal(format!("Model loading task failed: {}", e)))?
    }

    pub fn image_pipeline(&self) -> ImagePipeline {
        ImagePipeline::new(self.compositor.clone()).with_labels(LabelExport {
            enabled: self.config.save_labels,
            with_confidence: self.config.save_confidence,
        })
    }

    pub fn janitor(&self) -> ArtifactJanitor {
        ArtifactJanitor::new(
            self.layout.clone(),
            self.transcodes.clone(),
            self.config.artifact_ttl,
            self.config.janitor_interval,
        )
        .enabled(self.config.enable_artifact_janitor)
    }

    /// Re-resolve the manifest and drop every cached detector.
    pub async fn reload_models(&self) -> MediaResult<ModelManifest> {
        let manifest = resolve_manifest(&self.config)?;
        *self.manifest.write().await = manifest.clone();
        self.detectors.clear();
        Ok(manifest)
    }
}

fn resolve_manifest(config: &AppConfig) -> MediaResult<ModelManifest> {
    ModelManifest::resolve(
        &config.layout.models_dir,
        &config.model_extension,
        config.model_manifest.as_deref(),
    )
}
