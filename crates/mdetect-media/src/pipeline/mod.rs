//! Batch image and frame-sequential video pipelines.

pub mod ffmpeg_io;
pub mod images;
pub mod video;

pub use ffmpeg_io::{FfmpegFrameReader, FfmpegFrameWriter};
