//! Chat-facing seam of the job pipeline.
//!
//! The pipeline never talks to a chat backend directly. It reports status
//! through a [`JobTransport`] bound to the job's status message, which keeps
//! orchestration free of any platform types.

use super::metadata::FileMetadata;
use super::JobError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// File extensions uploaded as native video
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "flv", "webm"];

/// Errors surfaced by a chat backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The backend asked us to wait before retrying
    #[error("flood control: retry after {0:?}")]
    FloodWait(Duration),
    /// The backend asked for a wait longer than we accept
    #[error("flood control wait of {0:?} exceeds the limit")]
    FloodWaitTooLong(Duration),
    /// Any other request failure
    #[error("request failed: {0}")]
    Request(String),
}

/// Progress snapshots shown in the status message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Metadata is being fetched
    Resolving,
    /// Download in progress
    Downloading {
        /// File name
        file_name: String,
        /// Expected size in bytes
        size: u64,
        /// Completion percentage
        percent: u8,
    },
    /// Upload in progress
    Uploading {
        /// File name
        file_name: String,
        /// Size in bytes
        size: u64,
        /// Completion percentage
        percent: u8,
    },
}

/// How a finished download is presented in the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Native video with optional duration
    Video {
        /// Duration in seconds, when known
        duration: Option<u32>,
        /// Allow playback before the upload is fully fetched
        supports_streaming: bool,
        /// Hide the preview behind a spoiler
        has_spoiler: bool,
    },
    /// Generic file
    Document,
}

/// Whether `file_name` has a video extension (case-insensitive)
#[must_use]
pub fn is_video(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// A downloaded file ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Path of the downloaded file
    pub path: PathBuf,
    /// Resolved metadata (caption and direct-download button)
    pub metadata: FileMetadata,
    /// Presentation
    pub kind: UploadKind,
    /// Thumbnail image, if one was fetched
    pub thumbnail: Option<PathBuf>,
}

/// Bytes sent so far out of the total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes handed to the backend
    pub sent: u64,
    /// Total payload size
    pub total: u64,
}

/// Chat operations the pipeline needs, bound to one status message
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Edit the status message to show `status`
    async fn update_status(&self, status: &JobStatus) -> Result<(), TransportError>;

    /// Edit the status message to describe a failure
    async fn report_failure(&self, error: &JobError) -> Result<(), TransportError>;

    /// Delete the status message
    async fn delete_status(&self) -> Result<(), TransportError>;

    /// Send the file into the chat, reporting bytes sent on `progress`
    async fn upload(
        &self,
        request: &UploadRequest,
        progress: UnboundedSender<UploadProgress>,
    ) -> Result<(), TransportError>;
}
