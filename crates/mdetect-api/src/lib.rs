//! Axum HTTP API server.
//!
//! This crate provides:
//! - Image and video prediction endpoints over a detector ensemble
//! - Range-aware delivery of result media
//! - Asynchronous HLS transcode jobs
//! - Artifact lifecycle management, rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{ArtifactJanitor, TranscodeService};
pub use state::AppState;
