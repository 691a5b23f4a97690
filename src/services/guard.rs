//! Concurrency guard for resolutions on a check-in surface
//!
//! At most one resolution may be in flight per surface. The guard is a
//! lease rather than a flag: it names its owner (process session + token)
//! and expires, so a crash mid-resolution cannot lock out future scans.
//! The lease can be mirrored to a [`LeaseStore`] so it survives restarts.
//! Store writes run on a background task in issue order, so taking or
//! releasing the guard never waits on storage.

use crate::domain::types::epoch_ms;
use crate::domain::ResolutionToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Busy lease as persisted between processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLease {
    pub owner: String,
    pub token: u64,
    pub expires_at_ms: u64,
}

/// Storage for the busy lease
#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<Option<PersistedLease>>;
    async fn store(&self, lease: &PersistedLease) -> anyhow::Result<()>;
    async fn clear(&self) -> anyhow::Result<()>;
}

/// Lease store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    lease: parking_lot::Mutex<Option<PersistedLease>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn load(&self) -> anyhow::Result<Option<PersistedLease>> {
        Ok(self.lease.lock().clone())
    }

    async fn store(&self, lease: &PersistedLease) -> anyhow::Result<()> {
        *self.lease.lock() = Some(lease.clone());
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.lease.lock() = None;
        Ok(())
    }
}

/// Pending change to the lease store
#[derive(Debug)]
enum LeaseWrite {
    Store(PersistedLease),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// Apply lease writes in order until the guard is dropped
async fn write_leases(store: Arc<dyn LeaseStore>, mut rx: mpsc::UnboundedReceiver<LeaseWrite>) {
    while let Some(write) = rx.recv().await {
        match write {
            LeaseWrite::Store(lease) => {
                if let Err(e) = store.store(&lease).await {
                    warn!(error = %format!("{:#}", e), token = %lease.token, "guard_lease_persist_failed");
                }
            }
            LeaseWrite::Clear => {
                if let Err(e) = store.clear().await {
                    warn!(error = %format!("{:#}", e), "guard_lease_clear_failed");
                }
            }
            LeaseWrite::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    token: ResolutionToken,
    expires_at: Instant,
}

/// Single-holder lease over the resolution critical section
pub struct ConcurrencyGuard {
    /// Identifies this process session in persisted leases
    owner: String,
    ttl: Duration,
    held: Option<Lease>,
    store: Arc<dyn LeaseStore>,
    reset_on_start: bool,
    writes: mpsc::UnboundedSender<LeaseWrite>,
}

impl ConcurrencyGuard {
    /// Create a free guard and start its store writer. Must be called
    /// inside a tokio runtime.
    pub fn new(ttl: Duration, store: Arc<dyn LeaseStore>, reset_on_start: bool) -> Self {
        let (writes, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_leases(store.clone(), rx));
        Self { owner: Uuid::now_v7().to_string(), ttl, held: None, store, reset_on_start, writes }
    }

    /// Reconcile with the store before first use. With `reset_on_start` any
    /// lease left behind is dropped; otherwise an unexpired lease from a
    /// previous process is honoured until it expires.
    pub async fn restore(&mut self) {
        if self.reset_on_start {
            if let Err(e) = self.store.clear().await {
                warn!(error = %format!("{:#}", e), "guard_lease_clear_failed");
            }
            return;
        }

        match self.store.load().await {
            Ok(Some(lease)) => {
                let now_ms = epoch_ms();
                if lease.expires_at_ms > now_ms {
                    let remaining = Duration::from_millis(lease.expires_at_ms - now_ms);
                    warn!(
                        owner = %lease.owner,
                        token = %lease.token,
                        remaining_ms = %remaining.as_millis(),
                        "guard_lease_inherited"
                    );
                    self.held = Some(Lease {
                        owner: lease.owner,
                        token: ResolutionToken(lease.token),
                        expires_at: Instant::now() + remaining,
                    });
                } else {
                    info!(owner = %lease.owner, token = %lease.token, "guard_stale_lease_cleared");
                    self.clear_store();
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %format!("{:#}", e), "guard_lease_load_failed"),
        }
    }

    /// Try to take the guard for `token`. Fails while another unexpired
    /// lease is held; an expired lease is reclaimed.
    pub fn try_enter(&mut self, token: ResolutionToken, now: Instant) -> bool {
        if let Some(ref lease) = self.held {
            if now < lease.expires_at {
                debug!(held_by = %lease.token, requested = %token, "guard_busy");
                return false;
            }
            warn!(owner = %lease.owner, token = %lease.token, "guard_lease_expired");
        }

        let lease = Lease { owner: self.owner.clone(), token, expires_at: now + self.ttl };
        self.persist(&lease);
        self.held = Some(lease);
        true
    }

    /// Release the guard if `token` holds it. Returns false for any other
    /// token, so a late completion cannot release a newer holder.
    pub fn leave(&mut self, token: ResolutionToken) -> bool {
        match self.held {
            Some(ref lease) if lease.token == token && lease.owner == self.owner => {
                self.held = None;
                self.clear_store();
                true
            }
            _ => false,
        }
    }

    /// Drop whatever lease is held (explicit cancel)
    pub fn force_release(&mut self) {
        if let Some(lease) = self.held.take() {
            debug!(token = %lease.token, "guard_force_released");
            self.clear_store();
        }
    }

    pub fn is_held(&self, now: Instant) -> bool {
        self.held.as_ref().is_some_and(|lease| now < lease.expires_at)
    }

    /// Token of the current holder, if it belongs to this process
    pub fn holder(&self) -> Option<ResolutionToken> {
        self.held.as_ref().filter(|lease| lease.owner == self.owner).map(|lease| lease.token)
    }

    /// Wait until every lease write issued so far has reached the store
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.writes.send(LeaseWrite::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    fn persist(&self, lease: &Lease) {
        let remaining = lease.expires_at.saturating_duration_since(Instant::now());
        let persisted = PersistedLease {
            owner: lease.owner.clone(),
            token: lease.token.0,
            expires_at_ms: epoch_ms() + remaining.as_millis() as u64,
        };
        self.send(LeaseWrite::Store(persisted));
    }

    fn clear_store(&self) {
        self.send(LeaseWrite::Clear);
    }

    fn send(&self, write: LeaseWrite) {
        if self.writes.send(write).is_err() {
            warn!("guard_lease_writer_stopped");
        }
    }
}
