//! HLS packaging of annotated videos.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::layout::HLS_PLAYLIST;
use crate::probe::probe_video;

/// Segment file pattern inside the output directory.
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";

/// Packages a video into a VOD HLS playlist with H.264 segments.
#[derive(Debug, Clone)]
pub struct HlsPackager {
    segment_secs: u32,
    timeout_secs: Option<u64>,
}

impl Default for HlsPackager {
    fn default() -> Self {
        Self {
            segment_secs: 10,
            timeout_secs: None,
        }
    }
}

impl HlsPackager {
    pub fn new(segment_secs: u32) -> Self {
        Self {
            segment_secs: segment_secs.max(1),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the packaging command writing `<out_dir>/index.m3u8`.
    pub fn command(&self, input: &Path, out_dir: &Path) -> FfmpegCommand {
        let segments = out_dir.join(SEGMENT_PATTERN);
        FfmpegCommand::new(input, out_dir.join(HLS_PLAYLIST))
            .video_codec("libx264")
            .preset("veryfast")
            .pixel_format("yuv420p")
            .no_audio()
            .output_args([
                "-f".to_string(),
                "hls".to_string(),
                "-hls_time".to_string(),
                self.segment_secs.to_string(),
                "-hls_playlist_type".to_string(),
                "vod".to_string(),
                "-hls_segment_filename".to_string(),
                segments.to_string_lossy().to_string(),
            ])
    }

    /// Package `input` into `out_dir`, returning the playlist path.
    pub async fn package(&self, input: &Path, out_dir: &Path) -> MediaResult<PathBuf> {
        tokio::fs::create_dir_all(out_dir).await?;

        // Duration only drives progress logging.
        let total_ms = probe_video(input)
            .await
            .map(|info| (info.duration * 1000.0) as i64)
            .unwrap_or(0);

        let cmd = self.command(input, out_dir);
        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        info!(input = %input.display(), out_dir = %out_dir.display(), "Packaging HLS");
        runner
            .run_with_progress(&cmd, move |progress| {
                if total_ms > 0 {
                    debug!(percent = format!("{:.1}", progress.percentage(total_ms)), "HLS progress");
                }
            })
            .await?;

        Ok(cmd.output().to_path_buf())
    }
}
