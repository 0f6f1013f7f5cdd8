//! Multi-model detection and compositing pipelines.
//!
//! This crate provides:
//! - A `Detector` abstraction with an ONNX Runtime YOLO implementation
//! - A process-wide detector cache and model manifest
//! - Ensemble loading and per-frame detection with configurable fault isolation
//! - Compositing of detections onto images, with EXIF orientation handling
//! - Batch image and FFmpeg-backed video pipelines
//! - FFprobe metadata and HLS packaging

pub mod command;
pub mod compositor;
pub mod detection;
pub mod error;
pub mod fs_utils;
pub mod hls;
pub mod layout;
pub mod metrics;
pub mod pipeline;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compositor::{read_still, Compositor, FrameRenderer, Still};
pub use detection::{
    Detector, DetectorCache, DetectorLoader, Ensemble, EnsembleMember, FailurePolicy,
    ModelManifest, YoloDetector, YoloLoader,
};
pub use error::{MediaError, MediaResult};
pub use hls::HlsPackager;
pub use layout::StorageLayout;
pub use pipeline::images::{BatchReport, ImagePipeline, LabelExport};
pub use pipeline::video::{
    run_video, FrameSink, FrameSource, VideoOptions, VideoOutcome, VideoReport,
};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
