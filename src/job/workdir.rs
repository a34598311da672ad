//! Per-job working directory.
//!
//! [`JobDir::remove`] is the normal cleanup path. If a `JobDir` is dropped
//! without it (the job future was cancelled or panicked), `Drop` removes the
//! directory synchronously so it never outlives the job.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Working directory owned by exactly one job
#[derive(Debug)]
pub struct JobDir {
    path: PathBuf,
    removed: bool,
}

impl JobDir {
    /// Create the directory (and missing parents).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub async fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    /// Directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory and everything in it.
    ///
    /// Failures are logged and reported as `false`; they never fail a job.
    pub async fn remove(mut self) -> bool {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                info!(job_dir = %self.path.display(), "🧹 Cleaned job directory");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(job_dir = %self.path.display(), "Job directory already gone");
                true
            }
            Err(e) => {
                warn!(job_dir = %self.path.display(), error = %e, "Failed to clean job directory");
                false
            }
        }
    }
}

impl Drop for JobDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(job_dir = %self.path.display(), error = %e, "Failed to clean job directory on drop");
            }
        }
    }
}
