//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    cleanup, get_transcode, health, list_models, predict_images, predict_video, ready, reload_models, root,
    serve_result,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, RateLimiterCache};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    // Uploads are large; the limit applies to the whole multipart body.
    let predict_routes = Router::new()
        .route("/predict/images", post(predict_images))
        .route("/predict/video", post(predict_video))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware))
        .layer(DefaultBodyLimit::max(state.config.max_body_size));

    let media_routes = Router::new()
        .route("/results/*path", get(serve_result))
        .route("/transcode/:job_id", get(get_transcode));

    let model_routes = Router::new()
        .route("/models", get(list_models))
        .route("/models/reload", post(reload_models))
        .route("/maintenance/cleanup", post(cleanup));

    let health_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(predict_routes)
        .merge(media_routes)
        .merge(model_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
