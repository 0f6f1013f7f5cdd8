//! Model manifest handlers.

use axum::extract::State;
use axum::Json;
use mdetect_media::ModelManifest;
use mdetect_models::ModelInfo;
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

fn model_infos(manifest: &ModelManifest) -> Vec<ModelInfo> {
    manifest
        .models()
        .iter()
        .map(|spec| ModelInfo {
            name: spec.name.clone(),
            path: spec.path.display().to_string(),
            threshold: spec.threshold,
        })
        .collect()
}

/// List the models every prediction runs, in ensemble order.
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    Json(model_infos(&*state.manifest.read().await))
}

/// Rebuild the manifest and drop cached detectors.
pub async fn reload_models(State(state): State<AppState>) -> ApiResult<Json<Vec<ModelInfo>>> {
    let manifest = state.reload_models().await?;
    info!(models = manifest.len(), "Models reloaded");
    Ok(Json(model_infos(&manifest)))
}
