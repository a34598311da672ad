//! Flood-control handling shared by every chat operation.
//!
//! When the backend signals a wait, the operation sleeps for the signaled
//! duration and is retried exactly once. Waits above the limit are not slept
//! through; the caller gets [`TransportError::FloodWaitTooLong`] instead.

use super::transport::TransportError;
use crate::config::FLOOD_WAIT_LIMIT_SECS;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default longest wait that is still honored
pub const FLOOD_WAIT_LIMIT: Duration = Duration::from_secs(FLOOD_WAIT_LIMIT_SECS);

/// Run `operation`, retrying once after a flood-control wait.
///
/// # Errors
///
/// Returns the operation's error, or `FloodWaitTooLong` when the signaled
/// wait exceeds `limit`.
pub async fn with_flood_control<F, Fut, T>(limit: Duration, mut operation: F) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut retried = false;
    loop {
        match operation().await {
            Err(TransportError::FloodWait(wait)) if !retried => {
                if wait > limit {
                    warn!(wait = ?wait, "Flood-control wait exceeds limit, giving up");
                    return Err(TransportError::FloodWaitTooLong(wait));
                }
                warn!(wait = ?wait, "Flood control hit, sleeping before retry");
                tokio::time::sleep(wait).await;
                retried = true;
            }
            other => return other,
        }
    }
}
