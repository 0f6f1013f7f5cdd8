//! Range-aware delivery of result media.

use std::io::ErrorKind;
use std::path::{Component, Path as FsPath, PathBuf};

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use futures_util::stream::{self, Stream};
use mdetect_models::ByteRange;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Read size for streamed bodies.
pub const CHUNK_SIZE: usize = 4096;

/// Stream a file under the results root, honoring a single `Range`.
pub async fn serve_result(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let relative = safe_relative_path(&path).ok_or_else(|| ApiError::bad_request("Invalid file path"))?;
    let full_path = state.layout.results_dir.join(&relative);

    let metadata = match tokio::fs::metadata(&full_path).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(ApiError::not_found("Video not found")),
    };
    let size = metadata.len();

    let range = headers
        .get(header::RANGE)
        .map(|value| {
            let value = value
                .to_str()
                .map_err(|_| ApiError::bad_request("Malformed range header"))?;
            ByteRange::parse(value, size).map_err(ApiError::from)
        })
        .transpose()?;

    let mut file = File::open(&full_path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to open {}: {}", relative.display(), e)))?;

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type_for(&relative))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_ENCODING, "identity");

    let (builder, length) = match range {
        Some(range) => {
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(|e| ApiError::internal(format!("Seek failed: {}", e)))?;
            debug!(file = %relative.display(), range = %range, "Serving partial content");
            (
                builder
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_RANGE, range.content_range()),
                range.len(),
            )
        }
        None => (builder.status(StatusCode::OK), size),
    };

    builder
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(file_chunks(file, length)))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

/// Accept only plain relative components.
fn safe_relative_path(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() || raw.contains('\\') {
        return None;
    }

    let path = FsPath::new(raw);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            _ => return None,
        }
    }
    // Reject empty segments such as `a//b`, which `components` would fold.
    if raw.split('/').any(|s| s.is_empty()) {
        return None;
    }

    (!clean.as_os_str().is_empty()).then_some(clean)
}

fn content_type_for(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "m3u8" => "application/vnd.apple.mpegurl",
        "ts" => "video/mp2t",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Read up to `remaining` bytes in `CHUNK_SIZE` pieces.
///
/// A broken pipe or reset while reading ends the stream quietly.
fn file_chunks(file: File, remaining: u64) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    stream::unfold((file, remaining), |(mut file, remaining)| async move {
        if remaining == 0 {
            return None;
        }

        let mut buf = vec![0u8; chunk_len(remaining)];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), (file, remaining - n as u64)))
            }
            Err(e) if matches!(e.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionReset) => {
                debug!("Stream closed by peer: {}", e);
                None
            }
            Err(e) => Some((Err(e), (file, 0))),
        }
    })
}

/// Read size for the next chunk, never above [`CHUNK_SIZE`].
fn chunk_len(remaining: u64) -> usize {
    usize::try_from(remaining).map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE))
}
