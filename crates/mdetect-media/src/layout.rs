//! Filesystem layout for uploads and results.

use std::path::{Path, PathBuf};

use crate::error::MediaResult;

/// Subfolder used for still images under both roots.
pub const IMAGES_DIR: &str = "images";
/// Playlist file name inside an HLS directory.
pub const HLS_PLAYLIST: &str = "index.m3u8";

/// Explicit storage roots handed to the pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub models_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(
        models_dir: impl Into<PathBuf>,
        uploads_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            models_dir: models_dir.into(),
            uploads_dir: uploads_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    /// Layout rooted at a single base directory.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self::new(base.join("models"), base.join("uploads"), base.join("results"))
    }

    /// Create every directory the service writes to.
    pub fn ensure(&self) -> MediaResult<()> {
        for dir in [
            &self.models_dir,
            &self.uploads_dir,
            &self.results_dir,
            &self.image_uploads_dir(),
            &self.image_results_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// `uploads/images`
    pub fn image_uploads_dir(&self) -> PathBuf {
        self.uploads_dir.join(IMAGES_DIR)
    }

    /// `results/images`
    pub fn image_results_dir(&self) -> PathBuf {
        self.results_dir.join(IMAGES_DIR)
    }

    /// `uploads/<video>`
    pub fn video_upload_path(&self, file_name: &str) -> PathBuf {
        self.uploads_dir.join(file_name)
    }

    /// Annotated video file name for an uploaded video.
    pub fn result_video_name(file_name: &str) -> String {
        format!("result_{}", file_name)
    }

    /// `results/result_<video>`
    pub fn video_result_path(&self, file_name: &str) -> PathBuf {
        self.results_dir.join(Self::result_video_name(file_name))
    }

    /// HLS directory name for an uploaded video.
    pub fn hls_dir_name(file_name: &str) -> String {
        format!("hls_{}", file_name)
    }

    /// `results/hls_<video>`
    pub fn hls_dir(&self, file_name: &str) -> PathBuf {
        self.results_dir.join(Self::hls_dir_name(file_name))
    }

    /// Directories the janitor sweeps; their own entries are evicted, the
    /// directories themselves are kept.
    pub fn sweep_roots(&self) -> Vec<PathBuf> {
        vec![
            self.image_uploads_dir(),
            self.image_results_dir(),
            self.uploads_dir.clone(),
            self.results_dir.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = StorageLayout::under("/srv/mdetect");
        assert_eq!(layout.image_uploads_dir(), Path::new("/srv/mdetect/uploads/images"));
        assert_eq!(layout.image_results_dir(), Path::new("/srv/mdetect/results/images"));
        assert_eq!(layout.video_upload_path("dive.mp4"), Path::new("/srv/mdetect/uploads/dive.mp4"));
        assert_eq!(
            layout.video_result_path("dive.mp4"),
            Path::new("/srv/mdetect/results/result_dive.mp4")
        );
        assert_eq!(layout.hls_dir("dive.mp4"), Path::new("/srv/mdetect/results/hls_dive.mp4"));
    }

    #[test]
    fn test_ensure_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::under(dir.path());
        layout.ensure().unwrap();
        assert!(layout.models_dir.is_dir());
        assert!(layout.image_uploads_dir().is_dir());
        assert!(layout.image_results_dir().is_dir());
    }
}
