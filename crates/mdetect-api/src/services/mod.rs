//! Background and long-running services.

pub mod artifact_janitor;
pub mod transcode;

pub use artifact_janitor::ArtifactJanitor;
pub use transcode::TranscodeService;
