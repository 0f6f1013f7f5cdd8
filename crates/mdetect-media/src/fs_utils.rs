//! Filesystem utilities for uploads and artifact lifecycle.

use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Reduce a client-supplied file name to a safe single path component.
///
/// Directory parts are discarded and any character outside
/// `[A-Za-z0-9._-]` becomes `_`. Returns `None` when nothing usable remains.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        None
    } else {
        Some(cleaned)
    }
}

/// Write `bytes` to `dst` through a temporary sibling and a rename, so
/// readers never observe a partially written file.
pub async fn write_atomic(dst: impl AsRef<Path>, bytes: &[u8]) -> MediaResult<()> {
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let file_name = dst
        .file_name()
        .ok_or_else(|| MediaError::internal(format!("Invalid destination: {}", dst.display())))?;
    let tmp_dst = dst.with_file_name(format!(".{}.part", file_name.to_string_lossy()));

    fs::write(&tmp_dst, bytes).await?;

    fs::rename(&tmp_dst, dst).await.map_err(|e| {
        let _ = std::fs::remove_file(&tmp_dst);
        tracing::error!(
            "Failed to move upload into place: {} -> {}: {}",
            tmp_dst.display(),
            dst.display(),
            e
        );
        MediaError::from(e)
    })
}

/// Entries removed by a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

impl SweepStats {
    pub fn merge(&mut self, other: SweepStats) {
        self.files_removed += other.files_removed;
        self.dirs_removed += other.dirs_removed;
    }
}

/// Remove direct entries of `dir` last modified more than `ttl` ago.
///
/// Directories are removed recursively. Names in `keep` are never touched.
/// A missing `dir` is not an error.
pub async fn remove_stale_entries(dir: &Path, ttl: Duration, keep: &[&str]) -> MediaResult<SweepStats> {
    let mut stats = SweepStats::default();
    let now = SystemTime::now();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if keep.iter().any(|k| name.as_os_str() == *k) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < ttl {
            continue;
        }

        let path = entry.path();
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&path).await.map(|_| stats.dirs_removed += 1)
        } else {
            fs::remove_file(&path).await.map(|_| stats.files_removed += 1)
        };

        if let Err(e) = removed {
            tracing::warn!("Failed to remove stale artifact {}: {}", path.display(), e);
        } else {
            tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "Removed stale artifact");
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};

    fn age(path: &Path, secs: u64) {
        let file = File::open(path).unwrap();
        let time = SystemTime::now() - Duration::from_secs(secs);
        file.set_times(FileTimes::new().set_modified(time)).unwrap();
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("dive.mp4").as_deref(), Some("dive.mp4"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\photos\\reef 01.jpg").as_deref(), Some("reef_01.jpg"));
        assert_eq!(sanitize_file_name(".hidden.png").as_deref(), Some("hidden.png"));
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("dir/"), None);
    }

    #[tokio::test]
    async fn test_write_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("nested").join("upload.jpg");

        write_atomic(&dst, b"pixels").await.unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), b"pixels");
        assert!(!dir.path().join("nested").join(".upload.jpg.part").exists());
    }

    #[tokio::test]
    async fn test_remove_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let old_file = dir.path().join("result_old.mp4");
        let new_file = dir.path().join("result_new.mp4");
        let old_dir = dir.path().join("hls_old.mp4");
        let kept_dir = dir.path().join("images");

        std::fs::write(&old_file, b"x").unwrap();
        std::fs::write(&new_file, b"x").unwrap();
        std::fs::create_dir(&old_dir).unwrap();
        std::fs::write(old_dir.join("segment_000.ts"), b"x").unwrap();
        std::fs::create_dir(&kept_dir).unwrap();

        age(&old_file, 7200);
        age(&old_dir, 7200);
        age(&kept_dir, 7200);

        let stats = remove_stale_entries(dir.path(), Duration::from_secs(3600), &["images"])
            .await
            .unwrap();

        assert_eq!(stats, SweepStats { files_removed: 1, dirs_removed: 1 });
        assert!(!old_file.exists());
        assert!(!old_dir.exists());
        assert!(new_file.exists());
        assert!(kept_dir.exists());
    }

    #[tokio::test]
    async fn test_remove_stale_entries_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let stats = remove_stale_entries(&dir.path().join("missing"), Duration::ZERO, &[])
            .await
            .unwrap();
        assert_eq!(stats, SweepStats::default());
    }
}
