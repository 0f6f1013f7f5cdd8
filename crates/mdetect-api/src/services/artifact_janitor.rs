//! Background eviction of stale uploads, results and transcode jobs.

use std::time::Duration;

use mdetect_media::fs_utils::{remove_stale_entries, SweepStats};
use mdetect_media::layout::IMAGES_DIR;
use mdetect_media::StorageLayout;
use mdetect_models::CleanupReport;
use tokio::time::interval;
use tracing::{error, info};

use crate::metrics;
use crate::services::TranscodeService;

/// Artifact janitor service.
pub struct ArtifactJanitor {
    layout: StorageLayout,
    transcodes: TranscodeService,
    ttl: Duration,
    interval: Duration,
    enabled: bool,
}

impl ArtifactJanitor {
    pub fn new(layout: StorageLayout, transcodes: TranscodeService, ttl: Duration, interval: Duration) -> Self {
        Self {
            layout,
            transcodes,
            ttl,
            interval,
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Start the background sweep loop.
    ///
    /// This function runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Artifact janitor is disabled");
            return;
        }

        info!(
            "Starting artifact janitor (interval: {:?}, ttl: {:?})",
            self.interval, self.ttl
        );

        let mut ticker = interval(self.interval);

        loop {
            ticker.tick().await;

            if let Err(e) = self.check_once().await {
                error!("Artifact sweep error: {}", e);
            }
        }
    }

    /// Run a single sweep.
    pub async fn check_once(&self) -> anyhow::Result<CleanupReport> {
        let mut stats = SweepStats::default();

        for root in self.layout.sweep_roots() {
            // The images folders live inside the roots; only their contents expire.
            let keep: &[&str] = if root == self.layout.uploads_dir || root == self.layout.results_dir {
                &[IMAGES_DIR]
            } else {
                &[]
            };
            stats.merge(remove_stale_entries(&root, self.ttl, keep).await?);
        }

        let report = CleanupReport {
            files_removed: stats.files_removed,
            dirs_removed: stats.dirs_removed,
            jobs_pruned: self.transcodes.prune_finished(self.ttl).await,
        };

        if report != CleanupReport::default() {
            info!(
                files = report.files_removed,
                dirs = report.dirs_removed,
                jobs = report.jobs_pruned,
                "Artifact sweep complete"
            );
        }
        metrics::record_cleanup(&report);

        Ok(report)
    }
}
