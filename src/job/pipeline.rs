//! Job orchestration.
//!
//! Sequences metadata resolution, the size gate, the download, the upload and
//! cleanup. The working directory is removed before the final status is
//! reported, whatever the outcome.

use super::download::{DownloadRequest, Downloader};
use super::flood::{with_flood_control, FLOOD_WAIT_LIMIT};
use super::metadata::{FileMetadata, MetadataResolver};
use super::probe::MediaProbe;
use super::progress::{percent_of, ProgressTracker};
use super::transport::{
    is_video, JobStatus, JobTransport, TransportError, UploadKind, UploadProgress, UploadRequest,
};
use super::workdir::JobDir;
use super::{Job, JobError, JobOutcome, JobStage};
use crate::config::{
    upload_timeout, Settings, DOWNLOAD_TIMEOUT_SECS, FAILURE_HOLD_SECS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Name of the thumbnail file inside the job directory
pub const THUMBNAIL_FILE_NAME: &str = "thumb.jpg";

/// Minimum share of the expected size a download must reach, in percent
pub const MIN_COMPLETE_PERCENT: u128 = 95;

type StepResult<T> = Result<T, (JobStage, JobError)>;

/// Tunables for [`JobPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Largest accepted file, in bytes
    pub max_size_bytes: u64,
    /// Wall-clock bound for the download tool
    pub download_timeout: Duration,
    /// How long a failure report stays visible
    pub failure_hold: Duration,
    /// Longest flood-control wait that is still honored
    pub flood_wait_limit: Duration,
    /// Send videos with streaming enabled
    pub supports_streaming: bool,
    /// Send videos behind a spoiler
    pub has_spoiler: bool,
}

impl PipelineConfig {
    /// Pipeline tunables derived from application settings
    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            max_size_bytes: settings.max_size_bytes(),
            download_timeout: Duration::from_secs(DOWNLOAD_TIMEOUT_SECS),
            failure_hold: Duration::from_secs(FAILURE_HOLD_SECS),
            flood_wait_limit: FLOOD_WAIT_LIMIT,
            supports_streaming: settings.supports_streaming,
            has_spoiler: settings.has_spoiler,
        }
    }
}

/// Runs jobs end to end against a [`JobTransport`]
#[derive(Clone)]
pub struct JobPipeline {
    resolver: Arc<dyn MetadataResolver>,
    downloader: Arc<dyn Downloader>,
    probe: Arc<dyn MediaProbe>,
    config: PipelineConfig,
}

impl JobPipeline {
    /// Assemble a pipeline from its collaborators
    #[must_use]
    pub fn new(
        resolver: Arc<dyn MetadataResolver>,
        downloader: Arc<dyn Downloader>,
        probe: Arc<dyn MediaProbe>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            resolver,
            downloader,
            probe,
            config,
        }
    }

    /// Run `job` to completion.
    ///
    /// Never returns an error: failures are reported through `transport` and
    /// summarized in the returned [`JobOutcome`].
    pub async fn run(&self, job: &Job, transport: &dyn JobTransport) -> JobOutcome {
        info!(
            user_id = job.requester_id,
            job_dir = %job.work_dir.display(),
            url = %job.source_url,
            "🚀 Job started"
        );

        let result = match JobDir::create(&job.work_dir).await {
            Ok(dir) => {
                let result = self.execute(job, dir.path(), transport).await;
                dir.remove().await;
                result
            }
            Err(e) => Err((JobStage::Created, JobError::Io(e))),
        };

        self.finish(job, result, transport).await
    }

    async fn execute(
        &self,
        job: &Job,
        dir: &Path,
        transport: &dyn JobTransport,
    ) -> StepResult<()> {
        self.show(transport, &JobStatus::Resolving).await;

        let metadata = self
            .resolver
            .resolve(&job.source_url)
            .await
            .map_err(|e| (JobStage::MetadataResolved, JobError::from(e)))?;
        info!(
            user_id = job.requester_id,
            file_name = %metadata.name,
            size = metadata.size,
            "Metadata resolved"
        );

        if metadata.size > self.config.max_size_bytes {
            return Err((
                JobStage::SizeChecked,
                JobError::TooLarge {
                    size: metadata.size,
                    max: self.config.max_size_bytes,
                },
            ));
        }

        let mut tracker = ProgressTracker::new();
        let file_path = self
            .download(dir, &metadata, transport, &mut tracker)
            .await
            .map_err(|e| (JobStage::Downloaded, e))?;

        self.upload(dir, file_path, &metadata, transport, &mut tracker)
            .await
            .map_err(|e| (JobStage::Uploaded, e))
    }

    /// Download the file and verify it reached at least 95% of the expected size
    async fn download(
        &self,
        dir: &Path,
        metadata: &FileMetadata,
        transport: &dyn JobTransport,
        tracker: &mut ProgressTracker,
    ) -> Result<PathBuf, JobError> {
        let request = DownloadRequest {
            url: metadata.direct_url.clone(),
            dir: dir.to_path_buf(),
            file_name: metadata.name.clone(),
        };
        self.show(transport, &downloading(metadata, 0)).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let timed = tokio::time::timeout(
            self.config.download_timeout,
            self.downloader.download(&request, tx),
        );
        tokio::pin!(timed);

        let finished = loop {
            tokio::select! {
                result = &mut timed => break result,
                Some(percent) = rx.recv() => {
                    if tracker.record_download(percent) {
                        self.show(transport, &downloading(metadata, percent)).await;
                    }
                }
            }
        };

        match finished {
            Err(_) => {
                warn!(file_name = %metadata.name, "Download timed out, tool killed");
                return Err(JobError::DownloadTimeout(self.config.download_timeout));
            }
            Ok(result) => result?,
        }

        let path = request.output_path();
        let actual = verify_download(&path, metadata.size).await?;
        info!(
            file_name = %metadata.name,
            expected = metadata.size,
            actual,
            "Download verified"
        );
        Ok(path)
    }

    async fn upload(
        &self,
        dir: &Path,
        path: PathBuf,
        metadata: &FileMetadata,
        transport: &dyn JobTransport,
        tracker: &mut ProgressTracker,
    ) -> Result<(), JobError> {
        let actual_size = tokio::fs::metadata(&path).await?.len();
        let thumbnail = self.fetch_thumbnail(metadata, dir).await;
        let kind = if is_video(&metadata.name) {
            UploadKind::Video {
                duration: self.probe.video_duration(&path).await,
                supports_streaming: self.config.supports_streaming,
                has_spoiler: self.config.has_spoiler,
            }
        } else {
            UploadKind::Document
        };
        let request = UploadRequest {
            path,
            metadata: metadata.clone(),
            kind,
            thumbnail,
        };
        self.show(transport, &uploading(metadata, 0)).await;

        let limit = upload_timeout(actual_size);
        let (tx, mut rx) = mpsc::unbounded_channel::<UploadProgress>();
        let request_ref = &request;
        let send = with_flood_control(self.config.flood_wait_limit, move || {
            transport.upload(request_ref, tx.clone())
        });
        let timed = tokio::time::timeout(limit, send);
        tokio::pin!(timed);

        let finished = loop {
            tokio::select! {
                result = &mut timed => break result,
                Some(progress) = rx.recv() => {
                    let percent = percent_of(progress.sent, progress.total);
                    if tracker.record_upload(percent) {
                        self.show(transport, &uploading(metadata, percent)).await;
                    }
                }
            }
        };

        match finished {
            Err(_) => Err(JobError::UploadTimeout(limit)),
            Ok(Err(TransportError::FloodWaitTooLong(wait))) => Err(JobError::FloodControl(wait)),
            Ok(Err(e)) => Err(JobError::UploadFailed(e.to_string())),
            Ok(Ok(())) => {
                info!(file_name = %metadata.name, "Upload finished");
                Ok(())
            }
        }
    }

    /// Best-effort thumbnail download into the job directory
    async fn fetch_thumbnail(&self, metadata: &FileMetadata, dir: &Path) -> Option<PathBuf> {
        let url = metadata.thumbnail_url.as_deref()?;
        let dest = dir.join(THUMBNAIL_FILE_NAME);
        match self.resolver.fetch_thumbnail(url, &dest).await {
            Ok(()) => Some(dest),
            Err(e) => {
                warn!(error = %e, "Thumbnail download failed, continuing without it");
                None
            }
        }
    }

    async fn finish(
        &self,
        job: &Job,
        result: StepResult<()>,
        transport: &dyn JobTransport,
    ) -> JobOutcome {
        let limit = self.config.flood_wait_limit;
        match result {
            Ok(()) => {
                if let Err(e) = with_flood_control(limit, || transport.delete_status()).await {
                    warn!(error = %e, "Failed to delete status message");
                }
                info!(user_id = job.requester_id, "✅ Job done");
                JobOutcome::Done
            }
            Err((stage, error)) => {
                warn!(
                    user_id = job.requester_id,
                    stage = %stage,
                    error = %error,
                    "❌ Job failed"
                );
                if let Err(e) = with_flood_control(limit, || transport.report_failure(&error)).await {
                    warn!(error = %e, "Failed to report job failure");
                }
                tokio::time::sleep(self.config.failure_hold).await;
                if let Err(e) = with_flood_control(limit, || transport.delete_status()).await {
                    warn!(error = %e, "Failed to delete status message");
                }
                JobOutcome::Failed { stage, error }
            }
        }
    }

    /// Edit the status message; failures are logged and otherwise ignored
    async fn show(&self, transport: &dyn JobTransport, status: &JobStatus) {
        let result =
            with_flood_control(self.config.flood_wait_limit, || transport.update_status(status))
                .await;
        match result {
            Ok(()) => {}
            Err(TransportError::FloodWaitTooLong(wait)) => {
                warn!(wait = ?wait, "Skipping status edit, flood-control wait too long");
            }
            Err(e) => warn!(error = %e, "Status edit failed"),
        }
    }
}

fn downloading(metadata: &FileMetadata, percent: u8) -> JobStatus {
    JobStatus::Downloading {
        file_name: metadata.name.clone(),
        size: metadata.size,
        percent,
    }
}

fn uploading(metadata: &FileMetadata, percent: u8) -> JobStatus {
    JobStatus::Uploading {
        file_name: metadata.name.clone(),
        size: metadata.size,
        percent,
    }
}

/// Check that `path` exists and holds at least 95% of `expected` bytes.
///
/// # Errors
///
/// Returns `JobError::Incomplete` when the file is missing or too small.
pub async fn verify_download(path: &Path, expected: u64) -> Result<u64, JobError> {
    let actual = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return Err(JobError::Incomplete { expected, actual: 0 }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(JobError::Incomplete { expected, actual: 0 });
        }
        Err(e) => return Err(JobError::Io(e)),
    };

    if u128::from(actual) * 100 < u128::from(expected) * MIN_COMPLETE_PERCENT {
        return Err(JobError::Incomplete { expected, actual });
    }
    Ok(actual)
}
