//! Image and video prediction handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Multipart, Query, State};
use axum::Json;
use mdetect_media::fs_utils::{sanitize_file_name, write_atomic};
use mdetect_media::{run_video, StorageLayout, VideoOptions, VideoOutcome};
use mdetect_models::{ImagePredictionResponse, VideoPredictionResponse};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Parse `confs_threshold` values: comma or whitespace separated floats.
fn parse_thresholds(raw: &str) -> ApiResult<Vec<f32>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f32>()
                .map_err(|_| ApiError::Validation(format!("Invalid confidence threshold: {}", s)))
        })
        .collect()
}

fn upload_name(raw: Option<&str>) -> ApiResult<String> {
    raw.and_then(sanitize_file_name)
        .ok_or_else(|| ApiError::Validation("Uploaded file has no usable name".to_string()))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::bad_request(format!("Invalid multipart data: {}", e))
}

/// Annotate uploaded images with every model in the manifest.
pub async fn predict_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImagePredictionResponse>> {
    let start = Instant::now();
    let uploads_dir = state.layout.image_uploads_dir();
    let results_dir = state.layout.image_results_dir();

    let mut thresholds: Option<Vec<f32>> = None;
    let mut uploaded = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "confs_threshold" => {
                let text = field.text().await.map_err(multipart_error)?;
                thresholds
                    .get_or_insert_with(Vec::new)
                    .extend(parse_thresholds(&text)?);
            }
            "images" => {
                let name = upload_name(field.file_name())?;
                let data = field.bytes().await.map_err(multipart_error)?;
                write_atomic(uploads_dir.join(&name), &data).await?;
                uploaded += 1;
            }
            other => {
                warn!(field = %other, "Ignoring unexpected form field");
            }
        }
    }

    if uploaded == 0 {
        return Err(ApiError::Validation("No images uploaded".to_string()));
    }

    let ensemble = state.image_ensemble(thresholds).await?;
    let pipeline = state.image_pipeline();

    info!(images = uploaded, models = ensemble.len(), "Running image prediction");

    let output_dir = results_dir.clone();
    let report = tokio::task::spawn_blocking(move || pipeline.run(&ensemble, &uploads_dir, &output_dir))
        .await
        .map_err(|e| ApiError::internal(format!("Image task failed: {}", e)))??;

    metrics::record_prediction("images", report.is_clean(), start.elapsed().as_secs_f64());

    Ok(Json(ImagePredictionResponse {
        result_folder: results_dir.display().to_string(),
        processed: report.processed,
        failed: report.failed,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoQuery {
    pub max_frames: Option<u64>,
}

/// Annotate an uploaded video, then queue HLS packaging.
pub async fn predict_video(
    State(state): State<AppState>,
    Query(query): Query<VideoQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<VideoPredictionResponse>> {
    let start = Instant::now();
    let mut video_name: Option<String> = None;
    let mut max_frames = query.max_frames;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "video" => {
                let name = upload_name(field.file_name())?;
                let data = field.bytes().await.map_err(multipart_error)?;
                write_atomic(state.layout.video_upload_path(&name), &data).await?;
                video_name = Some(name);
            }
            "max_frames" => {
                let text = field.text().await.map_err(multipart_error)?;
                let value = text
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::Validation(format!("Invalid max_frames: {}", text.trim())))?;
                max_frames = Some(value);
            }
            other => {
                warn!(field = %other, "Ignoring unexpected form field");
            }
        }
    }

    let name = video_name.ok_or_else(|| ApiError::Validation("No video uploaded".to_string()))?;
    let input = state.layout.video_upload_path(&name);
    let output = state.layout.video_result_path(&name);
    let options = VideoOptions {
        max_frames: Some(max_frames.unwrap_or(state.config.default_max_frames)),
        policy: state.config.frame_failure_policy,
    };

    let permit = Arc::clone(&state.video_slots)
        .acquire_owned()
        .await
        .map_err(|_| ApiError::internal("Video admission closed"))?;
    metrics::set_video_jobs_active(state.config.max_concurrent_video_jobs - state.video_slots.available_permits());

    let result = async {
        let ensemble = state.video_ensemble().await?;
        run_video(
            &input,
            &output,
            Arc::new(ensemble),
            Arc::new(state.compositor.clone()),
            options,
        )
        .await
        .map_err(ApiError::from)
    }
    .await;

    drop(permit);
    metrics::set_video_jobs_active(state.config.max_concurrent_video_jobs - state.video_slots.available_permits());

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            metrics::record_prediction("video", false, start.elapsed().as_secs_f64());
            return Err(e);
        }
    };

    if report.outcome == VideoOutcome::InputUnreadable {
        metrics::record_prediction("video", false, start.elapsed().as_secs_f64());
        return Err(ApiError::unprocessable(format!("Could not open video file: {}", name)));
    }

    let hls_dir_name = StorageLayout::hls_dir_name(&name);
    let hls_url = format!("/results/{}/{}", hls_dir_name, mdetect_media::layout::HLS_PLAYLIST);
    let job = state
        .transcodes
        .submit(output, state.layout.hls_dir(&name), hls_url.clone())
        .await;

    metrics::record_prediction("video", true, start.elapsed().as_secs_f64());
    info!(
        video = %name,
        frames_written = report.frames_written,
        frames_dropped = report.frames_dropped,
        job_id = %job.job_id,
        "Video prediction complete"
    );

    Ok(Json(VideoPredictionResponse {
        result_video_filename: StorageLayout::result_video_name(&name),
        hls_url,
        job_id: job.job_id.to_string(),
        frames_written: report.frames_written,
        frames_dropped: report.frames_dropped,
    }))
}
