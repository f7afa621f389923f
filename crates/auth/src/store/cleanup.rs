//! Scheduled cleanup decorator
//!
//! Bounds the lifetime of stale persisted data even if nobody calls
//! `read`: a fixed-interval sweep forces a read, and every backend evicts
//! an expired record on read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{CredentialStore, StoreChange};
use crate::error::StoreError;
use crate::types::StoredRecord;

/// Decorator that sweeps expired records on a fixed interval
///
/// Composes over any backend without changing the contract. Must be
/// constructed inside a tokio runtime; the sweep task is released by
/// [`CredentialStore::close`] or on drop.
pub struct CleanupStore {
    inner: Arc<dyn CredentialStore>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupStore {
    /// Wrap `inner`, sweeping it every `interval`
    #[must_use]
    pub fn new(inner: Arc<dyn CredentialStore>, interval: Duration) -> Self {
        let swept = inner.clone();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                // Backends evict expired records on read, so a read is the sweep
                match swept.read().await {
                    Ok(_) => debug!("credential store sweep completed"),
                    Err(e) => debug!(error = %e, "credential store sweep skipped"),
                }
            }
        });

        Self { inner, sweeper: Mutex::new(Some(sweeper)) }
    }
}

#[async_trait]
impl CredentialStore for CleanupStore {
    async fn read(&self) -> Result<Option<StoredRecord>, StoreError> {
        self.inner.read().await
    }

    async fn write(&self, record: &StoredRecord) -> Result<(), StoreError> {
        self.inner.write(record).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear().await
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn changes(&self) -> Option<broadcast::Receiver<StoreChange>> {
        self.inner.changes()
    }

    fn close(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.inner.close();
    }
}

impl Drop for CleanupStore {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}
