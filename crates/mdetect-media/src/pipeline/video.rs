//! Frame-sequential video pipeline.
//!
//! Frames are decoded, run through the ensemble, composited and encoded one
//! at a time. Per-frame failures drop the frame; only an encoder failure
//! aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use serde::Serialize;
use tracing::{info, warn};

use super::ffmpeg_io::{FfmpegFrameReader, FfmpegFrameWriter};
use crate::command::check_ffmpeg;
use crate::compositor::FrameRenderer;
use crate::detection::{Ensemble, FailurePolicy};
use crate::error::{MediaError, MediaResult};
use crate::metrics;
use crate::probe::{probe_video, FALLBACK_FPS};

/// Sequential frame decoder.
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    fn read_frame(&mut self) -> MediaResult<Option<RgbImage>>;
}

/// Sequential frame encoder.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()>;

    /// Flush and close the output.
    fn finish(self: Box<Self>) -> MediaResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VideoOptions {
    /// Stop after this many written frames; `None` or `Some(0)` means no limit.
    pub max_frames: Option<u64>,
    pub policy: FailurePolicy,
}

impl VideoOptions {
    fn limit(&self) -> Option<u64> {
        self.max_frames.filter(|m| *m > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOutcome {
    /// Input exhausted (or a read failed)
    EndOfStream,
    /// `max_frames` frames were written
    LimitReached,
    /// Input could not be opened; nothing was written
    InputUnreadable,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
    pub frames_read: u64,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub detector_failures: u64,
    pub outcome: VideoOutcome,
    /// Annotated output, absent when the input was unreadable
    pub output: Option<PathBuf>,
}

impl VideoReport {
    fn new(outcome: VideoOutcome) -> Self {
        Self {
            frames_read: 0,
            frames_written: 0,
            frames_dropped: 0,
            detector_failures: 0,
            outcome,
            output: None,
        }
    }
}

/// Annotate `input` into `output`.
///
/// An input FFprobe cannot read yields `VideoOutcome::InputUnreadable`
/// rather than an error.
pub async fn run_video(
    input: &Path,
    output: &Path,
    ensemble: Arc<Ensemble>,
    renderer: Arc<dyn FrameRenderer>,
    options: VideoOptions,
) -> MediaResult<VideoReport> {
    check_ffmpeg()?;

    let info = match probe_video(input).await {
        Ok(info) if info.width > 0 && info.height > 0 => info,
        Ok(_) => {
            warn!(input = %input.display(), "Video has no decodable frames");
            return Ok(VideoReport::new(VideoOutcome::InputUnreadable));
        }
        Err(e) => {
            warn!(input = %input.display(), error = %e, "Cannot open video");
            return Ok(VideoReport::new(VideoOutcome::InputUnreadable));
        }
    };

    let fps = if info.fps > 0.0 { info.fps } else { FALLBACK_FPS };
    let (width, height) = info.display_size();
    info!(
        input = %input.display(),
        width = width,
        height = height,
        rotation = ?info.rotation,
        fps = fps,
        frames = ?info.frame_count,
        max_frames = ?options.limit(),
        "Processing video"
    );

    let input = input.to_path_buf();
    let output = output.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let source = FfmpegFrameReader::spawn(&input, width, height)?;
        let sink = FfmpegFrameWriter::spawn(&output, width, height, fps)?;

        let mut report = process_stream(Box::new(source), Box::new(sink), &ensemble, renderer.as_ref(), &options)?;
        report.output = Some(output);
        Ok(report)
    })
    .await
    .map_err(|e| MediaError::internal(format!("Video task failed: {}", e)))?
}

/// Run the frame loop, then release both ends whatever the loop returned.
pub fn process_stream(
    mut source: Box<dyn FrameSource>,
    mut sink: Box<dyn FrameSink>,
    ensemble: &Ensemble,
    renderer: &dyn FrameRenderer,
    options: &VideoOptions,
) -> MediaResult<VideoReport> {
    let looped = process_frames(source.as_mut(), sink.as_mut(), ensemble, renderer, options);
    drop(source);
    let finished = sink.finish();

    let report = looped?;
    finished?;

    info!(
        written = report.frames_written,
        dropped = report.frames_dropped,
        detector_failures = report.detector_failures,
        outcome = ?report.outcome,
        "Video processing finished"
    );
    Ok(report)
}

fn process_frames(
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    ensemble: &Ensemble,
    renderer: &dyn FrameRenderer,
    options: &VideoOptions,
) -> MediaResult<VideoReport> {
    let mut report = VideoReport::new(VideoOutcome::EndOfStream);
    let limit = options.limit();

    loop {
        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(frame = report.frames_read, error = %e, "Frame read failed, treating as end of stream");
                break;
            }
        };
        let index = report.frames_read;
        report.frames_read += 1;

        let result = match options.policy {
            FailurePolicy::DropFrame => match ensemble.run(&frame) {
                Ok(result) => result,
                Err(e) => {
                    warn!(frame = index, error = %e, "Detection failed, dropping frame");
                    report.detector_failures += 1;
                    report.frames_dropped += 1;
                    metrics::record_frame_dropped("detector");
                    continue;
                }
            },
            FailurePolicy::SkipDetector => {
                let run = ensemble.run_isolated(&frame);
                report.detector_failures += run.failures as u64;
                run.result
            }
        };

        let annotated = match renderer.render(frame, &result) {
            Ok(annotated) => annotated,
            Err(e) => {
                warn!(frame = index, error = %e, "Compositing failed, dropping frame");
                report.frames_dropped += 1;
                metrics::record_frame_dropped("composite");
                continue;
            }
        };

        sink.write_frame(&annotated)?;
        report.frames_written += 1;
        metrics::record_frame_written();

        if limit.is_some_and(|max| report.frames_written >= max) {
            report.outcome = VideoOutcome::LimitReached;
            break;
        }
    }

    Ok(report)
}
