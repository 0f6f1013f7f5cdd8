//! Asynchronous HLS transcode jobs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a transcode job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TranscodeJobId(pub String);

impl TranscodeJobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TranscodeJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TranscodeJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transcode job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
}

impl TranscodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeStatus::Queued => "queued",
            TranscodeStatus::Running => "running",
            TranscodeStatus::Completed => "completed",
            TranscodeStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscodeStatus::Completed | TranscodeStatus::Failed)
    }
}

/// A request to segment an annotated video into an HLS playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscodeJob {
    pub job_id: TranscodeJobId,
    pub status: TranscodeStatus,
    /// Source video file name within the results directory
    pub source: String,
    /// URL of the playlist once completed
    pub playlist_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranscodeJob {
    /// Create a queued job.
    pub fn new(source: impl Into<String>, playlist_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: TranscodeJobId::new(),
            status: TranscodeStatus::Queued,
            source: source.into(),
            playlist_url: playlist_url.into(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TranscodeStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = TranscodeStatus::Completed;
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TranscodeStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}
