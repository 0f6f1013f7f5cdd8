//! Asynchronous HLS transcode jobs.
//!
//! Packaging runs as a detached tokio task; callers poll the job record.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mdetect_media::HlsPackager;
use mdetect_models::{TranscodeJob, TranscodeJobId};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::metrics;

/// Tracks transcode jobs and runs them in the background.
#[derive(Clone)]
pub struct TranscodeService {
    jobs: Arc<RwLock<HashMap<TranscodeJobId, TranscodeJob>>>,
    packager: HlsPackager,
}

impl TranscodeService {
    pub fn new(packager: HlsPackager) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            packager,
        }
    }

    /// Queue packaging of `source` into `out_dir` and return the queued job.
    pub async fn submit(&self, source: PathBuf, out_dir: PathBuf, playlist_url: String) -> TranscodeJob {
        let source_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let job = TranscodeJob::new(source_name, playlist_url);
        let job_id = job.job_id.clone();

        self.jobs.write().await.insert(job_id.clone(), job.clone());
        metrics::record_transcode_submitted();

        let service = self.clone();
        tokio::spawn(async move {
            service.update(&job_id, |job| job.mark_running()).await;
            info!(job_id = %job_id, source = %source.display(), "Transcode started");

            match service.packager.package(&source, &out_dir).await {
                Ok(playlist) => {
                    info!(job_id = %job_id, playlist = %playlist.display(), "Transcode completed");
                    metrics::record_transcode_finished(true);
                    service.update(&job_id, |job| job.mark_completed()).await;
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Transcode failed");
                    metrics::record_transcode_finished(false);
                    service
                        .update(&job_id, |job| job.mark_failed(format!("HLS conversion failed: {}", e)))
                        .await;
                }
            }
        });

        job
    }

    pub async fn get(&self, job_id: &TranscodeJobId) -> Option<TranscodeJob> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Drop finished jobs last updated more than `older_than` ago.
    pub async fn prune_finished(&self, older_than: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.updated_at < cutoff));
        before - jobs.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    async fn update(&self, job_id: &TranscodeJobId, apply: impl FnOnce(&mut TranscodeJob)) {
        if let Some(job) = self.jobs.write().await.get_mut(job_id) {
            apply(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdetect_models::TranscodeStatus;

    async fn wait_terminal(service: &TranscodeService, id: &TranscodeJobId) -> TranscodeJob {
        for _ in 0..200 {
            let job = service.get(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("transcode job did not finish");
    }

    #[tokio::test]
    async fn test_missing_source_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let service = TranscodeService::new(HlsPackager::new(4).with_timeout(5));

        let job = service
            .submit(
                dir.path().join("result_missing.mp4"),
                dir.path().join("hls_missing.mp4"),
                "/results/hls_missing.mp4/index.m3u8".to_string(),
            )
            .await;
        assert_eq!(job.status, TranscodeStatus::Queued);
        assert_eq!(job.source, "result_missing.mp4");

        let finished = wait_terminal(&service, &job.job_id).await;
        assert_eq!(finished.status, TranscodeStatus::Failed);
        assert!(finished.error.unwrap().starts_with("HLS conversion failed"));
    }

    #[tokio::test]
    async fn test_prune_finished_keeps_active_jobs() {
        let service = TranscodeService::new(HlsPackager::default());

        let mut done = TranscodeJob::new("a.mp4", "/results/hls_a.mp4/index.m3u8");
        done.mark_completed();
        let running = {
            let mut job = TranscodeJob::new("b.mp4", "/results/hls_b.mp4/index.m3u8");
            job.mark_running();
            job
        };
        {
            let mut jobs = service.jobs.write().await;
            jobs.insert(done.job_id.clone(), done.clone());
            jobs.insert(running.job_id.clone(), running.clone());
        }

        assert_eq!(service.prune_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(service.prune_finished(Duration::ZERO).await, 1);
        assert!(service.get(&done.job_id).await.is_none());
        assert!(service.get(&running.job_id).await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let service = TranscodeService::new(HlsPackager::default());
        assert!(service.get(&TranscodeJobId::new()).await.is_none());
        assert_eq!(service.len().await, 0);
    }
}
