//! On-demand maintenance.

use axum::extract::State;
use axum::Json;
use mdetect_models::CleanupReport;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Run one artifact sweep now.
pub async fn cleanup(State(state): State<AppState>) -> ApiResult<Json<CleanupReport>> {
    state
        .janitor()
        .check_once()
        .await
        .map(Json)
        .map_err(|e| ApiError::internal(format!("Cleanup failed: {}", e)))
}
