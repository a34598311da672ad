use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use terabox_courier::config::{DOWNLOAD_TIMEOUT_SECS, FAILURE_HOLD_SECS};
use terabox_courier::job::flood::FLOOD_WAIT_LIMIT;
use terabox_courier::job::{
    DownloadRequest, Downloader, FileMetadata, Job, JobError, JobOutcome, JobPipeline, JobStage,
    JobStatus, JobTransport, MediaProbe, MetadataError, MetadataResolver, PipelineConfig,
    TransportError, UploadKind, UploadProgress, UploadRequest,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

const MIB: u64 = 1024 * 1024;

fn metadata(name: &str, size: u64) -> FileMetadata {
    FileMetadata {
        name: name.to_string(),
        direct_url: format!("https://cdn.example/{name}"),
        size,
        thumbnail_url: None,
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        max_size_bytes: 1900 * MIB,
        download_timeout: Duration::from_secs(DOWNLOAD_TIMEOUT_SECS),
        failure_hold: Duration::from_secs(FAILURE_HOLD_SECS),
        flood_wait_limit: FLOOD_WAIT_LIMIT,
        supports_streaming: true,
        has_spoiler: false,
    }
}

struct FakeResolver {
    metadata: FileMetadata,
}

#[async_trait]
impl MetadataResolver for FakeResolver {
    async fn resolve(&self, _source_url: &str) -> Result<FileMetadata, MetadataError> {
        Ok(self.metadata.clone())
    }

    async fn fetch_thumbnail(&self, _url: &str, dest: &Path) -> Result<(), MetadataError> {
        std::fs::write(dest, b"jpeg").map_err(|e| MetadataError::Unreachable(e.to_string()))
    }
}

enum DownloadBehavior {
    /// Write a sparse file of this many bytes, reporting progress in 10% steps
    Complete(u64),
    /// Never finish; flag the drop so the test can tell the download was killed
    Hang(Arc<AtomicBool>),
}

struct FakeDownloader {
    behavior: DownloadBehavior,
    calls: AtomicUsize,
}

impl FakeDownloader {
    fn new(behavior: DownloadBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: UnboundedSender<u8>,
    ) -> Result<(), JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            DownloadBehavior::Complete(bytes) => {
                for percent in (10..=100).step_by(10) {
                    let _ = progress.send(percent);
                    tokio::task::yield_now().await;
                }
                let file = std::fs::File::create(request.output_path())?;
                file.set_len(*bytes)?;
                Ok(())
            }
            DownloadBehavior::Hang(killed) => {
                let _flag = DropFlag(killed.clone());
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

struct NoDuration;

#[async_trait]
impl MediaProbe for NoDuration {
    async fn video_duration(&self, _path: &Path) -> Option<u32> {
        None
    }
}

#[derive(Debug)]
enum Event {
    Status(JobStatus),
    Failure(String),
    Deleted,
    Uploaded(UploadRequest),
}

/// Transport recording every call with the (paused) time it happened
#[derive(Default)]
struct RecordingTransport {
    events: Mutex<Vec<(Instant, Event)>>,
    fail_upload: bool,
    stall_upload: bool,
}

impl RecordingTransport {
    fn failing_uploads() -> Self {
        Self {
            fail_upload: true,
            ..Self::default()
        }
    }

    fn stalling_uploads() -> Self {
        Self {
            stall_upload: true,
            ..Self::default()
        }
    }

    fn record(&self, event: Event) {
        self.events
            .lock()
            .expect("events lock")
            .push((Instant::now(), event));
    }

    fn events(&self) -> Vec<(Instant, Event)> {
        std::mem::take(&mut *self.events.lock().expect("events lock"))
    }
}

#[async_trait]
impl JobTransport for RecordingTransport {
    async fn update_status(&self, status: &JobStatus) -> Result<(), TransportError> {
        self.record(Event::Status(status.clone()));
        Ok(())
    }

    async fn report_failure(&self, error: &JobError) -> Result<(), TransportError> {
        self.record(Event::Failure(error.to_string()));
        Ok(())
    }

    async fn delete_status(&self) -> Result<(), TransportError> {
        self.record(Event::Deleted);
        Ok(())
    }

    async fn upload(
        &self,
        request: &UploadRequest,
        progress: UnboundedSender<UploadProgress>,
    ) -> Result<(), TransportError> {
        if self.fail_upload {
            return Err(TransportError::Request("Bad Request: file is too big".to_string()));
        }
        if self.stall_upload {
            std::future::pending::<()>().await;
        }
        let total = request.metadata.size;
        for step in 1..=100u64 {
            let _ = progress.send(UploadProgress {
                sent: total * step / 100,
                total,
            });
            // Let the pipeline drain progress while the "upload" runs
            tokio::task::yield_now().await;
        }
        self.record(Event::Uploaded(request.clone()));
        Ok(())
    }
}

fn pipeline(meta: FileMetadata, downloader: Arc<FakeDownloader>) -> JobPipeline {
    JobPipeline::new(
        Arc::new(FakeResolver { metadata: meta }),
        downloader,
        Arc::new(NoDuration),
        config(),
    )
}

#[tokio::test(start_paused = true)]
async fn video_within_limit_is_downloaded_uploaded_and_cleaned() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut meta = metadata("movie.mkv", 500 * MIB);
    meta.thumbnail_url = Some("https://cdn.example/thumb.jpg".to_string());
    let downloader = Arc::new(FakeDownloader::new(DownloadBehavior::Complete(500 * MIB)));
    let transport = RecordingTransport::default();

    let job = Job::new(11, "https://terabox.com/s/1movie", root.path());
    let outcome = pipeline(meta, downloader.clone()).run(&job, &transport).await;

    assert!(outcome.is_done(), "unexpected outcome: {outcome:?}");
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    assert!(!job.work_dir.exists());

    let events = transport.events();
    assert!(matches!(events.first(), Some((_, Event::Status(JobStatus::Resolving)))));
    assert!(matches!(events.last(), Some((_, Event::Deleted))));
    assert!(!events.iter().any(|(_, e)| matches!(e, Event::Failure(_))));

    let uploaded: Vec<&UploadRequest> = events
        .iter()
        .filter_map(|(_, e)| match e {
            Event::Uploaded(request) => Some(request),
            _ => None,
        })
        .collect();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(
        uploaded[0].kind,
        UploadKind::Video {
            duration: None,
            supports_streaming: true,
            has_spoiler: false
        }
    );
    assert!(uploaded[0].thumbnail.is_some());

    // Download progress only ever grows
    let downloading: Vec<u8> = events
        .iter()
        .filter_map(|(_, e)| match e {
            Event::Status(JobStatus::Downloading { percent, .. }) => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(downloading.first(), Some(&0));
    assert!(downloading.len() > 1);
    assert!(downloading.windows(2).all(|pair| pair[1] > pair[0]));

    // Upload progress: more than five points apart unless it is the final 100
    let uploading: Vec<u8> = events
        .iter()
        .filter_map(|(_, e)| match e {
            Event::Status(JobStatus::Uploading { percent, .. }) => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(uploading.first(), Some(&0));
    assert!(uploading.len() > 1);
    for pair in uploading.windows(2) {
        assert!(pair[1] > pair[0] + 5 || pair[1] == 100, "{pair:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn oversized_file_fails_before_download_and_holds_the_error() {
    let root = tempfile::tempdir().expect("tempdir");
    let downloader = Arc::new(FakeDownloader::new(DownloadBehavior::Complete(0)));
    let transport = RecordingTransport::default();

    let job = Job::new(12, "https://terabox.com/s/1huge", root.path());
    let outcome = pipeline(metadata("huge.zip", 2500 * MIB), downloader.clone())
        .run(&job, &transport)
        .await;

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            stage: JobStage::SizeChecked,
            error: JobError::TooLarge { .. }
        }
    ));
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
    assert!(!job.work_dir.exists());

    let events = transport.events();
    let failed_at = events
        .iter()
        .find_map(|(at, e)| matches!(e, Event::Failure(_)).then_some(*at))
        .expect("failure reported");
    let deleted_at = events
        .iter()
        .find_map(|(at, e)| matches!(e, Event::Deleted).then_some(*at))
        .expect("status deleted");
    assert!(deleted_at - failed_at >= Duration::from_secs(FAILURE_HOLD_SECS));
    assert!(!events.iter().any(|(_, e)| matches!(e, Event::Uploaded(_))));
}

#[tokio::test(start_paused = true)]
async fn stalled_download_times_out_and_is_killed() {
    let root = tempfile::tempdir().expect("tempdir");
    let killed = Arc::new(AtomicBool::new(false));
    let downloader = Arc::new(FakeDownloader::new(DownloadBehavior::Hang(killed.clone())));
    let transport = RecordingTransport::default();
    let started = Instant::now();

    let job = Job::new(13, "https://terabox.com/s/1slow", root.path());
    let outcome = pipeline(metadata("slow.bin", 100 * MIB), downloader)
        .run(&job, &transport)
        .await;

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            stage: JobStage::Downloaded,
            error: JobError::DownloadTimeout(_)
        }
    ));
    assert!(started.elapsed() >= Duration::from_secs(DOWNLOAD_TIMEOUT_SECS));
    assert!(killed.load(Ordering::SeqCst), "download was not dropped");
    assert!(!job.work_dir.exists());

    let events = transport.events();
    assert!(events.iter().any(|(_, e)| matches!(e, Event::Failure(_))));
    assert!(!events.iter().any(|(_, e)| matches!(e, Event::Uploaded(_))));
}

#[tokio::test(start_paused = true)]
async fn incomplete_download_is_not_uploaded() {
    let root = tempfile::tempdir().expect("tempdir");
    let downloader = Arc::new(FakeDownloader::new(DownloadBehavior::Complete(50 * MIB)));
    let transport = RecordingTransport::default();

    let job = Job::new(14, "https://terabox.com/s/1half", root.path());
    let outcome = pipeline(metadata("half.iso", 100 * MIB), downloader)
        .run(&job, &transport)
        .await;

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            stage: JobStage::Downloaded,
            error: JobError::Incomplete { .. }
        }
    ));
    assert!(!job.work_dir.exists());
    assert!(!transport
        .events()
        .iter()
        .any(|(_, e)| matches!(e, Event::Uploaded(_))));
}

#[tokio::test(start_paused = true)]
async fn rejected_upload_still_cleans_up() {
    let root = tempfile::tempdir().expect("tempdir");
    let downloader = Arc::new(FakeDownloader::new(DownloadBehavior::Complete(MIB)));
    let transport = RecordingTransport::failing_uploads();

    let job = Job::new(15, "https://terabox.com/s/1doc", root.path());
    let outcome = pipeline(metadata("doc.pdf", MIB), downloader)
        .run(&job, &transport)
        .await;

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            stage: JobStage::Uploaded,
            error: JobError::UploadFailed(_)
        }
    ));
    assert!(!job.work_dir.exists());
    assert!(matches!(transport.events().last(), Some((_, Event::Deleted))));
}

#[tokio::test(start_paused = true)]
async fn stalled_upload_times_out_after_a_size_scaled_limit() {
    let root = tempfile::tempdir().expect("tempdir");
    let downloader = Arc::new(FakeDownloader::new(DownloadBehavior::Complete(120 * MIB)));
    let transport = RecordingTransport::stalling_uploads();
    let started = Instant::now();

    let job = Job::new(17, "https://terabox.com/s/1stuck", root.path());
    let outcome = pipeline(metadata("stuck.zip", 120 * MIB), downloader)
        .run(&job, &transport)
        .await;

    // Two full 50 MiB chunks on top of the ten minute floor
    let limit = Duration::from_secs(720);
    assert!(
        matches!(
            &outcome,
            JobOutcome::Failed {
                stage: JobStage::Uploaded,
                error: JobError::UploadTimeout(waited)
            } if *waited == limit
        ),
        "unexpected outcome: {outcome:?}"
    );
    assert!(started.elapsed() >= limit);
    assert!(!job.work_dir.exists());

    let events = transport.events();
    assert!(events.iter().any(|(_, e)| matches!(e, Event::Failure(_))));
    assert!(matches!(events.last(), Some((_, Event::Deleted))));
}

#[tokio::test(start_paused = true)]
async fn dropped_job_does_not_leave_its_directory_behind() {
    let root = tempfile::tempdir().expect("tempdir");
    let killed = Arc::new(AtomicBool::new(false));
    let downloader = Arc::new(FakeDownloader::new(DownloadBehavior::Hang(killed.clone())));
    let transport = RecordingTransport::default();
    let pipeline = pipeline(metadata("slow.bin", MIB), downloader);

    let job = Job::new(16, "https://terabox.com/s/1drop", root.path());
    let run = pipeline.run(&job, &transport);
    let cut_short = tokio::time::timeout(Duration::from_secs(60), run).await;

    assert!(cut_short.is_err());
    assert!(killed.load(Ordering::SeqCst));
    assert!(!job.work_dir.exists());
}
