//! Transcode job status.

use axum::extract::{Path, State};
use axum::Json;
use mdetect_models::{TranscodeJob, TranscodeJobId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn get_transcode(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<TranscodeJob>> {
    state
        .transcodes
        .get(&TranscodeJobId::from_string(job_id))
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Transcode job not found"))
}
