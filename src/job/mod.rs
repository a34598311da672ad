//! Per-link job pipeline.
//!
//! A job resolves a share link into [`FileMetadata`], checks the size against
//! the configured limit, downloads the file into its own working directory,
//! uploads it back into the chat and finally removes the working directory.
//! Chat-specific behavior lives behind [`JobTransport`], so the pipeline can
//! be driven by tests without a bot.

/// Subprocess download stage (aria2c)
pub mod download;
/// Flood-control aware retry helper
pub mod flood;
/// Metadata API client
pub mod metadata;
/// Job orchestration
pub mod pipeline;
/// Media duration probe (ffprobe)
pub mod probe;
/// Progress bar, size formatting and throttling state
pub mod progress;
/// Chat-facing seam used by the pipeline
pub mod transport;
/// Per-job working directory
pub mod workdir;

pub use download::{Aria2Downloader, DownloadRequest, Downloader};
pub use metadata::{FileMetadata, HttpMetadataResolver, MetadataError, MetadataResolver};
pub use pipeline::{JobPipeline, PipelineConfig};
pub use probe::{FfprobeProbe, MediaProbe};
pub use progress::ProgressTracker;
pub use transport::{
    JobStatus, JobTransport, TransportError, UploadKind, UploadProgress, UploadRequest,
};
pub use workdir::JobDir;

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// One end-to-end handling of a single inbound link
#[derive(Debug, Clone)]
pub struct Job {
    /// Telegram ID of the requester
    pub requester_id: i64,
    /// Share link sent by the requester
    pub source_url: String,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// Working directory exclusively owned by this job
    pub work_dir: PathBuf,
}

impl Job {
    /// Create a job rooted under `download_root`.
    ///
    /// The directory name combines the requester, the creation time and a
    /// random suffix so concurrent jobs never share a directory. Nothing is
    /// created on disk here.
    #[must_use]
    pub fn new(requester_id: i64, source_url: impl Into<String>, download_root: &Path) -> Self {
        let created_at = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let dir_name = format!(
            "user_{requester_id}_{}_{}",
            created_at.timestamp_millis(),
            &suffix[..8]
        );
        Self {
            requester_id,
            source_url: source_url.into(),
            created_at,
            work_dir: download_root.join(dir_name),
        }
    }
}

/// Pipeline steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStage {
    /// Job accepted, nothing done yet
    Created,
    /// Metadata fetched from the API
    MetadataResolved,
    /// Size accepted by the size gate
    SizeChecked,
    /// File downloaded and verified
    Downloaded,
    /// File uploaded into the chat
    Uploaded,
    /// Status message cleared
    Done,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::MetadataResolved => "metadata_resolved",
            Self::SizeChecked => "size_checked",
            Self::Downloaded => "downloaded",
            Self::Uploaded => "uploaded",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal state of a job
#[derive(Debug)]
pub enum JobOutcome {
    /// Every step succeeded
    Done,
    /// The step `stage` could not be completed
    Failed {
        /// Step that failed
        stage: JobStage,
        /// Why it failed
        error: JobError,
    },
}

impl JobOutcome {
    /// Whether the job reached [`JobStage::Done`]
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Errors that terminate a job
#[derive(Debug, Error)]
pub enum JobError {
    /// The metadata API could not provide usable metadata
    #[error("metadata fetch failed: {0}")]
    Metadata(#[from] MetadataError),
    /// The file is larger than the configured maximum
    #[error("file too large: {size} bytes (max {max})")]
    TooLarge {
        /// Reported file size
        size: u64,
        /// Configured maximum
        max: u64,
    },
    /// The download did not finish in time
    #[error("download timed out after {0:?}")]
    DownloadTimeout(Duration),
    /// The download tool could not be run
    #[error("download failed: {0}")]
    DownloadFailed(String),
    /// The downloaded file is missing or too small
    #[error("incomplete download: expected {expected} bytes, got {actual}")]
    Incomplete {
        /// Size reported by the API
        expected: u64,
        /// Size found on disk (0 when missing)
        actual: u64,
    },
    /// The upload did not finish in time
    #[error("upload timed out after {0:?}")]
    UploadTimeout(Duration),
    /// The chat backend rejected the upload
    #[error("upload failed: {0}")]
    UploadFailed(String),
    /// The chat backend asked for a wait longer than we accept
    #[error("flood control wait of {0:?} is too long")]
    FloodControl(Duration),
    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
