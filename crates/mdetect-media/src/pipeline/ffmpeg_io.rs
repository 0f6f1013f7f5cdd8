//! Piped raw-RGB frame I/O through FFmpeg child processes.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use image::RgbImage;
use tracing::{debug, warn};

use super::video::{FrameSink, FrameSource};
use crate::command::{FfmpegCommand, STDERR_TAIL_LINES};
use crate::error::{MediaError, MediaResult};

/// Decodes a video into packed RGB24 frames.
pub struct FfmpegFrameReader {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl FfmpegFrameReader {
    /// FFmpeg applies display rotation while decoding, so `width` and
    /// `height` must be the rotated size.
    pub fn spawn(input: &Path, width: u32, height: u32) -> MediaResult<Self> {
        let cmd = FfmpegCommand::new(input, "-").raw_rgb_output().without_progress();
        debug!("Spawning frame reader: ffmpeg {}", cmd.build_args().join(" "));

        let mut child = cmd
            .to_std_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MediaError::internal("FFmpeg stdout not captured"));
            }
        };

        Ok(Self {
            child,
            stdout,
            width,
            height,
        })
    }
}

impl FrameSource for FfmpegFrameReader {
    fn read_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => RgbImage::from_raw(self.width, self.height, buf)
                .map(Some)
                .ok_or_else(|| MediaError::internal("Frame buffer size mismatch")),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Encodes packed RGB24 frames into an MPEG-4 Part 2 (`mp4v`) file.
pub struct FfmpegFrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<StderrTail>,
    width: u32,
    height: u32,
}

impl FfmpegFrameWriter {
    pub fn command(output: &Path, width: u32, height: u32, fps: f64) -> FfmpegCommand {
        FfmpegCommand::new("-", output)
            .raw_rgb_input(width, height, fps)
            .video_codec("mpeg4")
            .video_tag("mp4v")
            .pixel_format("yuv420p")
            .no_audio()
            .without_progress()
    }

    pub fn spawn(output: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Self> {
        let cmd = Self::command(output, width, height, fps);
        debug!("Spawning frame writer: ffmpeg {}", cmd.build_args().join(" "));

        let mut child = cmd
            .to_std_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take();
        let stderr = child.stderr.take().map(StderrTail::capture);

        Ok(Self {
            child,
            stdin,
            stderr,
            width,
            height,
        })
    }
}

impl FrameSink for FfmpegFrameWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MediaError::internal(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("Encoder input already closed"))?;
        stdin.write_all(frame.as_raw())?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> MediaResult<()> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());
        let status = self.child.wait()?;
        let stderr = self.stderr.take().and_then(StderrTail::collect);
        if status.success() {
            Ok(())
        } else {
            if let Some(ref stderr) = stderr {
                warn!(exit_code = ?status.code(), stderr = %stderr, "Encoder failed");
            }
            Err(MediaError::ffmpeg_failed(
                "Encoder exited with failure",
                stderr,
                status.code(),
            ))
        }
    }
}

impl Drop for FfmpegFrameWriter {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Keeps the last diagnostic lines a child process writes.
struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    reader: JoinHandle<()>,
}

impl StderrTail {
    fn capture(stream: impl Read + Send + 'static) -> Self {
        let lines = Arc::new(Mutex::new(VecDeque::new()));
        let writer = Arc::clone(&lines);
        let reader = std::thread::spawn(move || {
            for line in BufReader::new(stream).lines().map_while(Result::ok) {
                if let Ok(mut tail) = writer.lock() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        });
        Self { lines, reader }
    }

    /// Wait for the stream to close and join the kept lines.
    fn collect(self) -> Option<String> {
        let _ = self.reader.join();
        self.lines
            .lock()
            .map(|t| t.iter().cloned().collect::<Vec<_>>().join("\n"))
            .ok()
            .filter(|s| !s.is_empty())
    }
}
