//! Media duration probe.
//!
//! Failures never fail a job: an unreadable duration is simply unknown.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

/// Interface for media probes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Duration of the video at `path` in whole seconds, if it can be determined
    async fn video_duration(&self, path: &Path) -> Option<u32>;
}

/// Probe backed by the `ffprobe` binary
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
    timeout: Duration,
}

impl FfprobeProbe {
    /// Create a probe invoking `program` with the given time bound
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn video_duration(&self, path: &Path) -> Option<u32> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(error = %e, "ffprobe could not be run");
                return None;
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "ffprobe timed out");
                return None;
            }
        };

        let text = String::from_utf8_lossy(&output.stdout);
        let duration = parse_duration(&text);
        if duration.is_none() {
            warn!(output = %text.trim(), "ffprobe failed to detect duration");
        }
        duration
    }
}

/// Parse ffprobe's bare `format=duration` output into whole seconds.
///
/// Zero, negative and non-numeric values yield `None`.
#[must_use]
pub fn parse_duration(output: &str) -> Option<u32> {
    let seconds: f64 = output.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 1.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let whole = seconds.min(f64::from(u32::MAX)) as u32;
    Some(whole)
}
