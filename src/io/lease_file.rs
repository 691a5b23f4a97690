//! File-persisted busy lease for the concurrency guard
//!
//! The lease is a small JSON document. It is deleted on release, so an
//! absent file means the guard is free.

use crate::services::guard::{LeaseStore, PersistedLease};
use anyhow::Context;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct FileLeaseStore {
    path: PathBuf,
}

impl FileLeaseStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

#[async_trait]
impl LeaseStore for FileLeaseStore {
    async fn load(&self) -> anyhow::Result<Option<PersistedLease>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read lease {}", self.path.display()))
            }
        };
        let lease = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse lease {}", self.path.display()))?;
        Ok(Some(lease))
    }

    async fn store(&self, lease: &PersistedLease) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string(lease)?;
        // Write-then-rename so a crash never leaves a half-written lease
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).await.with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to move lease into {}", self.path.display()))
    }

    async fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove lease {}", self.path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::epoch_ms;
    use crate::domain::ResolutionToken;
    use crate::services::guard::ConcurrencyGuard;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_store_load_clear() {
        let dir = tempdir().unwrap();
        let store = FileLeaseStore::new(dir.path().join("guard/lease.json"));
        assert_eq!(store.load().await.unwrap(), None);

        let lease =
            PersistedLease { owner: "abc".to_string(), token: 4, expires_at_ms: 1_767_617_600_000 };
        store.store(&lease).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(lease));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_lease_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lease.json");
        std::fs::write(&path, "{").unwrap();
        assert!(FileLeaseStore::new(&path).load().await.is_err());
    }

    async fn restored(path: &Path, ttl: Duration, reset_on_start: bool) -> ConcurrencyGuard {
        let mut guard =
            ConcurrencyGuard::new(ttl, Arc::new(FileLeaseStore::new(path)), reset_on_start);
        guard.restore().await;
        guard
    }

    #[tokio::test]
    async fn test_lease_survives_restart_until_expiry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lease.json");
        let ttl = Duration::from_secs(30);

        // First process takes the guard and "crashes" without leaving
        let mut first = restored(&path, ttl, true).await;
        assert!(first.try_enter(ResolutionToken(1), Instant::now()));
        first.flush().await;
        drop(first);

        // Restart without reset: the lease is honoured
        let mut second = restored(&path, ttl, false).await;
        assert!(!second.try_enter(ResolutionToken(1), Instant::now()));

        // Restart with reset: a fresh session starts free
        let mut third = restored(&path, ttl, true).await;
        assert!(third.try_enter(ResolutionToken(1), Instant::now()));
        third.flush().await;
        let persisted = FileLeaseStore::new(&path).load().await.unwrap().unwrap();
        assert!(persisted.expires_at_ms > epoch_ms());
    }
}
