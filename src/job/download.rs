//! Download stage backed by aria2c.
//!
//! The tool writes into the job directory under a caller-chosen name with
//! overwrite enabled and auto-renaming disabled. Its stdout and stderr are
//! read line by line; every `(NN%)` token found is forwarded on the progress
//! channel. Dropping the download future kills the child process.

use super::progress::parse_progress_percent;
use super::JobError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// What to download and where to put it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Direct download URL
    pub url: String,
    /// Job working directory
    pub dir: PathBuf,
    /// Output file name inside `dir`
    pub file_name: String,
}

impl DownloadRequest {
    /// Full path of the expected output file
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Interface for download tools
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Run the download to completion, sending percentages on `progress`.
    ///
    /// Returning `Ok` only means the tool exited; the caller verifies the file.
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: UnboundedSender<u8>,
    ) -> Result<(), JobError>;
}

/// Multi-connection download via the `aria2c` binary
#[derive(Debug, Clone)]
pub struct Aria2Downloader {
    program: String,
    connections: u8,
}

impl Aria2Downloader {
    /// Create a downloader invoking `program` (usually `aria2c`)
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            connections: 16,
        }
    }

    /// Command-line arguments for `request`
    #[must_use]
    pub fn args(&self, request: &DownloadRequest) -> Vec<String> {
        vec![
            format!("-x{}", self.connections),
            "--summary-interval=1".to_string(),
            "--auto-file-renaming=false".to_string(),
            "--allow-overwrite=true".to_string(),
            format!("--dir={}", request.dir.display()),
            format!("--out={}", request.file_name),
            request.url.clone(),
        ]
    }
}

#[async_trait]
impl Downloader for Aria2Downloader {
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: UnboundedSender<u8>,
    ) -> Result<(), JobError> {
        let mut child = Command::new(&self.program)
            .args(self.args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobError::DownloadFailed(format!("failed to start {}: {e}", self.program)))?;

        info!(
            program = %self.program,
            pid = ?child.id(),
            file_name = %request.file_name,
            "Download started"
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let last_line = pump_combined(stdout, stderr, &progress).await;

        let status = child
            .wait()
            .await
            .map_err(|e| JobError::DownloadFailed(e.to_string()))?;

        if status.success() {
            info!(file_name = %request.file_name, "Download tool finished");
        } else {
            warn!(
                status = %status,
                last_output = %last_line.unwrap_or_default(),
                "Download tool exited with failure"
            );
        }
        Ok(())
    }
}

/// Read both output streams line by line until they close.
///
/// Returns the last non-empty line seen, for diagnostics.
async fn pump_combined<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    progress: &UnboundedSender<u8>,
) -> Option<String>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out = stdout.map(|s| BufReader::new(s).lines());
    let mut err = stderr.map(|s| BufReader::new(s).lines());
    let mut last = None;

    loop {
        let line = tokio::select! {
            line = next_line(&mut out), if out.is_some() => line,
            line = next_line(&mut err), if err.is_some() => line,
            else => break,
        };
        if let Some(line) = line {
            forward_progress(&line, progress);
            if !line.trim().is_empty() {
                last = Some(line);
            }
        }
    }
    last
}

/// Next line of an optional stream; closes the stream (sets `None`) at EOF.
async fn next_line<R>(lines: &mut Option<tokio::io::Lines<BufReader<R>>>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let reader = lines.as_mut()?;
    match reader.next_line().await {
        Ok(Some(line)) => Some(line),
        Ok(None) => {
            *lines = None;
            None
        }
        Err(e) => {
            debug!(error = %e, "Download output stream closed with error");
            *lines = None;
            None
        }
    }
}

fn forward_progress(line: &str, progress: &UnboundedSender<u8>) {
    if let Some(percent) = parse_progress_percent(line) {
        // A closed receiver only means nobody is watching any more
        let _ = progress.send(percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn builds_aria2c_arguments() {
        let downloader = Aria2Downloader::new("aria2c");
        let request = DownloadRequest {
            url: "https://cdn.example/f.mp4".to_string(),
            dir: PathBuf::from("downloads/user_1_2_ab"),
            file_name: "f.mp4".to_string(),
        };

        let args = downloader.args(&request);
        assert_eq!(args[0], "-x16");
        assert!(args.contains(&"--auto-file-renaming=false".to_string()));
        assert!(args.contains(&"--allow-overwrite=true".to_string()));
        assert!(args.contains(&"--dir=downloads/user_1_2_ab".to_string()));
        assert!(args.contains(&"--out=f.mp4".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://cdn.example/f.mp4"));
        assert_eq!(
            request.output_path(),
            PathBuf::from("downloads/user_1_2_ab/f.mp4")
        );
    }

    #[tokio::test]
    async fn pump_forwards_only_progress_tokens() {
        let output = b"\n*** Download Progress Summary ***\n\
            [#1c9b1b 20MiB/100MiB(20%) CN:1 DL:3.0MiB]\n\
            [#1c9b1b 0B/0B CN:1 DL:0B]\n\
            [#1c9b1b 60MiB/100MiB(60%) CN:16 DL:9.1MiB]\n\
            Download complete: downloads/f.mp4\n";
        let (tx, mut rx) = mpsc::unbounded_channel();

        let last = pump_combined::<&[u8], &[u8]>(Some(&output[..]), None, &tx).await;
        drop(tx);

        let mut seen = Vec::new();
        while let Some(p) = rx.recv().await {
            seen.push(p);
        }
        assert_eq!(seen, vec![20, 60]);
        assert_eq!(last.as_deref(), Some("Download complete: downloads/f.mp4"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_download_failure() {
        let downloader = Aria2Downloader::new("definitely-not-a-real-aria2c-binary");
        let request = DownloadRequest {
            url: "https://cdn.example/f.bin".to_string(),
            dir: std::env::temp_dir(),
            file_name: "f.bin".to_string(),
        };
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = downloader.download(&request, tx).await;
        assert!(matches!(result, Err(JobError::DownloadFailed(_))));
    }
}
