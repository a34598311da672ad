//! Storage for the authorized user list
//!
//! The list is a JSON array of Telegram user IDs. It is loaded once at startup
//! and rewritten after every change; writes go through a temporary file and a
//! rename so a crash never leaves a half-written list behind.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Errors that can occur during user list operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Interface for authorized user storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All authorized IDs in ascending order
    async fn list(&self) -> Vec<i64>;
    /// Authorize `user_id`; returns `false` if it was already present
    async fn add(&self, user_id: i64) -> Result<bool, StoreError>;
    /// Revoke `user_id`; returns `false` if it was not present
    async fn remove(&self, user_id: i64) -> Result<bool, StoreError>;
    /// Whether `user_id` is on the list
    async fn contains(&self, user_id: i64) -> bool;
}

/// User list persisted as a JSON file
pub struct JsonUserStore {
    path: PathBuf,
    users: RwLock<BTreeSet<i64>>,
}

impl JsonUserStore {
    /// Load the list from `path`.
    ///
    /// A missing file is an empty list. An unreadable or malformed file is
    /// logged and also treated as empty; it is overwritten on the next change.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let users = match read_users(&path).await {
            Ok(users) => {
                info!(path = %path.display(), count = users.len(), "Loaded authorized users");
                users
            }
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No authorized users file yet, starting empty");
                BTreeSet::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read authorized users, starting empty");
                BTreeSet::new()
            }
        };

        Self {
            path,
            users: RwLock::new(users),
        }
    }

    /// File backing this store
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_users(path: &Path) -> Result<BTreeSet<i64>, StoreError> {
    let raw = tokio::fs::read(path).await?;
    let ids: Vec<i64> = serde_json::from_slice(&raw)?;
    Ok(ids.into_iter().collect())
}

async fn write_users(path: &Path, users: &BTreeSet<i64>) -> Result<(), StoreError> {
    let ids: Vec<i64> = users.iter().copied().collect();
    let json = serde_json::to_vec_pretty(&ids)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl UserStore for JsonUserStore {
    async fn list(&self) -> Vec<i64> {
        self.users.read().await.iter().copied().collect()
    }

    async fn add(&self, user_id: i64) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        if !users.insert(user_id) {
            return Ok(false);
        }
        if let Err(e) = write_users(&self.path, &users).await {
            users.remove(&user_id);
            return Err(e);
        }
        info!(user_id, "User authorized");
        Ok(true)
    }

    async fn remove(&self, user_id: i64) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        if !users.remove(&user_id) {
            return Ok(false);
        }
        if let Err(e) = write_users(&self.path, &users).await {
            users.insert(user_id);
            return Err(e);
        }
        info!(user_id, "User deauthorized");
        Ok(true)
    }

    async fn contains(&self, user_id: i64) -> bool {
        self.users.read().await.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_an_empty_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonUserStore::load(dir.path().join("authorized_users.json")).await;
        assert!(store.list().await.is_empty());
        assert!(!store.contains(1).await);
    }

    #[tokio::test]
    async fn changes_are_persisted_and_reloaded() -> Result<(), StoreError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("authorized_users.json");

        let store = JsonUserStore::load(&path).await;
        assert!(store.add(42).await?);
        assert!(!store.add(42).await?);
        assert!(store.add(7).await?);
        assert!(store.remove(42).await?);
        assert!(!store.remove(42).await?);

        let reloaded = JsonUserStore::load(&path).await;
        assert_eq!(reloaded.list().await, vec![7]);

        let raw = std::fs::read_to_string(&path)?;
        let ids: Vec<i64> = serde_json::from_str(&raw)?;
        assert_eq!(ids, vec![7]);
        assert!(!path.with_extension("json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_file_starts_empty() -> Result<(), StoreError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("authorized_users.json");
        std::fs::write(&path, "not json")?;

        let store = JsonUserStore::load(&path).await;
        assert!(store.list().await.is_empty());
        assert!(store.add(5).await?);
        assert_eq!(JsonUserStore::load(&path).await.list().await, vec![5]);
        Ok(())
    }
}
