//! Process-wide detector cache.
//!
//! Entries are keyed by weight-file path and validated against the file's
//! modification time on every lookup, so replacing a weight file reloads it
//! without a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tracing::{debug, info};

use super::{Detector, DetectorLoader};
use crate::error::{MediaError, MediaResult};
use crate::metrics;

struct CachedDetector {
    modified: SystemTime,
    detector: Arc<dyn Detector>,
}

/// Read-mostly cache of loaded detectors shared across requests.
pub struct DetectorCache {
    loader: Arc<dyn DetectorLoader>,
    entries: RwLock<HashMap<PathBuf, CachedDetector>>,
}

impl DetectorCache {
    pub fn new(loader: Arc<dyn DetectorLoader>) -> Self {
        Self {
            loader,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached detector for `path`, loading it if absent or stale.
    pub fn get_or_load(&self, path: &Path) -> MediaResult<Arc<dyn Detector>> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|_| MediaError::model_not_found(path.display().to_string()))?;

        {
            let entries = self
                .entries
                .read()
                .map_err(|_| MediaError::internal("Detector cache lock poisoned"))?;
            if let Some(entry) = entries.get(path) {
                if entry.modified == modified {
                    metrics::record_detector_cache(true);
                    return Ok(Arc::clone(&entry.detector));
                }
                debug!(path = %path.display(), "Cached detector is stale");
            }
        }

        metrics::record_detector_cache(false);

        // Loading is slow; do it without holding the lock.
        let detector = self.loader.load(path)?;
        info!(path = %path.display(), model = %detector.name(), "Loaded detector");

        let mut entries = self
            .entries
            .write()
            .map_err(|_| MediaError::internal("Detector cache lock poisoned"))?;
        entries.insert(
            path.to_path_buf(),
            CachedDetector {
                modified,
                detector: Arc::clone(&detector),
            },
        );

        Ok(detector)
    }

    /// Drop one entry.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(path).is_some())
            .unwrap_or(false)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use mdetect_models::Detection;
    use std::fs::{File, FileTimes};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NamedDetector(String);

    impl Detector for NamedDetector {
        fn name(&self) -> &str {
            &self.0
        }

        fn detect(&self, _image: &RgbImage, _threshold: f32) -> MediaResult<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl DetectorLoader for CountingLoader {
        fn load(&self, path: &Path) -> MediaResult<Arc<dyn Detector>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NamedDetector(path.display().to_string())))
        }
    }

    fn set_mtime(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
        file.set_times(FileTimes::new().set_modified(time)).unwrap();
    }

    #[test]
    fn test_second_lookup_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fish.onnx");
        std::fs::write(&path, b"weights").unwrap();

        let loader = Arc::new(CountingLoader::default());
        let cache = DetectorCache::new(loader.clone());

        let a = cache.get_or_load(&path).unwrap();
        let b = cache.get_or_load(&path).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_modified_file_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fish.onnx");
        std::fs::write(&path, b"weights").unwrap();
        set_mtime(&path, 1_000_000);

        let loader = Arc::new(CountingLoader::default());
        let cache = DetectorCache::new(loader.clone());

        cache.get_or_load(&path).unwrap();
        set_mtime(&path, 2_000_000);
        cache.get_or_load(&path).unwrap();

        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fish.onnx");
        std::fs::write(&path, b"weights").unwrap();

        let loader = Arc::new(CountingLoader::default());
        let cache = DetectorCache::new(loader.clone());

        cache.get_or_load(&path).unwrap();
        assert!(cache.invalidate(&path));
        assert!(!cache.invalidate(&path));
        cache.get_or_load(&path).unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let cache = DetectorCache::new(Arc::new(CountingLoader::default()));
        let err = cache.get_or_load(Path::new("/nonexistent/model.onnx"));
        assert!(matches!(err, Err(MediaError::ModelNotFound(_))));
    }
}
