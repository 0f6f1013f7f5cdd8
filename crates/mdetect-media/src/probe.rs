//! FFprobe video information.

use mdetect_models::Rotation;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Frame rate used when the container reports none.
pub const FALLBACK_FPS: f64 = 30.0;

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Clockwise display rotation from the container metadata
    #[serde(default)]
    pub rotation: Rotation,
    /// Frame rate (fps), never zero
    pub fps: f64,
    /// Total frames (reported, or estimated from duration)
    pub frame_count: u64,
    /// Video codec
    pub codec: String,
    /// File size in bytes
    pub size: u64,
}

impl VideoInfo {
    /// Size of the frames FFmpeg decodes, which it rotates for display.
    pub fn display_size(&self) -> (u32, u32) {
        self.rotation.rotated_size(self.width, self.height)
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    /// Counter-clockwise degrees, from the display matrix
    rotation: Option<f64>,
}

impl FfprobeStream {
    fn rotation(&self) -> Rotation {
        let from_matrix = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .map(|ccw| -(ccw.round() as i32));
        let from_tag = self
            .tags
            .rotate
            .as_deref()
            .and_then(|r| r.trim().parse::<i32>().ok());

        from_matrix
            .or(from_tag)
            .map(Rotation::from_degrees)
            .unwrap_or_default()
    }
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(json: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MediaError::InvalidVideo(format!(
            "Invalid frame size {}x{}",
            width, height
        )));
    }

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = resolve_fps(
        video_stream.avg_frame_rate.as_deref(),
        video_stream.r_frame_rate.as_deref(),
    );

    let frame_count = video_stream
        .nb_frames
        .as_ref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round().max(0.0) as u64);

    Ok(VideoInfo {
        duration,
        width,
        height,
        rotation: video_stream.rotation(),
        fps,
        frame_count,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        size,
    })
}

/// Pick the first usable, non-zero frame rate, else [`FALLBACK_FPS`].
fn resolve_fps(avg: Option<&str>, real: Option<&str>) -> f64 {
    [avg, real]
        .into_iter()
        .flatten()
        .filter_map(parse_frame_rate)
        .find(|fps| *fps > 0.0 && fps.is_finite())
        .unwrap_or(FALLBACK_FPS)
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_zero_fps_falls_back() {
        assert_eq!(resolve_fps(Some("0/0"), Some("0/1")), FALLBACK_FPS);
        assert_eq!(resolve_fps(None, None), FALLBACK_FPS);
        assert!((resolve_fps(Some("0/0"), Some("25/1")) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "format": {"duration": "4.000000", "size": "123456"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                 "avg_frame_rate": "25/1", "r_frame_rate": "25/1", "nb_frames": "100"}
            ]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.frame_count, 100);
        assert_eq!(info.codec, "h264");
        assert_eq!(info.size, 123456);
        assert_eq!(info.rotation, Rotation::None);
    }

    #[test]
    fn test_parse_rotation_from_display_matrix() {
        let json = br#"{
            "format": {"duration": "1.0"},
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
                         "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.rotation, Rotation::Cw90);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.display_size(), (1080, 1920));
    }

    #[test]
    fn test_parse_rotation_from_tag() {
        let json = br#"{
            "format": {},
            "streams": [{"codec_type": "video", "width": 640, "height": 480, "tags": {"rotate": "270"}}]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.rotation, Rotation::Cw270);
        assert_eq!(info.display_size(), (480, 640));

        let json = br#"{
            "format": {},
            "streams": [{"codec_type": "video", "width": 640, "height": 480,
                         "tags": {"rotate": "180"}, "side_data_list": [{"side_data_type": "Other"}]}]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.rotation, Rotation::Cw180);
        assert_eq!(info.display_size(), (640, 480));
    }

    #[test]
    fn test_parse_probe_output_estimates_frames() {
        let json = br#"{
            "format": {"duration": "2.0"},
            "streams": [{"codec_type": "video", "width": 64, "height": 48, "avg_frame_rate": "0/0"}]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.fps, FALLBACK_FPS);
        assert_eq!(info.frame_count, 60);
    }

    #[test]
    fn test_parse_probe_output_without_video() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(parse_probe_output(json), Err(MediaError::InvalidVideo(_))));
    }
}
