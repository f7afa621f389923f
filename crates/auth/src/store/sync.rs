//! Cross-context sync decorator
//!
//! Two execution contexts ("tabs") sharing durable storage converge on the
//! same credential without polling: each context wraps its store in a
//! [`SyncStore`] attached to a host-provided [`ChangeBus`]. Local writes
//! and clears are published to the bus; every subscriber — including the
//! writer's own manager — observes the mutation and re-reads the store.
//!
//! Propagation is best-effort and unordered relative to each context's own
//! in-memory state; a context may briefly observe a stale credential until
//! the next notification arrives. That eventual-consistency window is
//! accepted, not a bug.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{CredentialStore, StoreChange};
use crate::error::StoreError;
use crate::types::StoredRecord;

const BUS_CAPACITY: usize = 16;

/// Host-provided change-notification source
///
/// The core's contract is only "the store may notify of external changes";
/// how a particular host wires contexts together (shared memory, an OS
/// watcher, a window event) is the host's concern. Cloning the bus shares
/// the underlying channel.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeBus {
    /// Create a new change bus
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribe to storage mutations
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }

    /// Publish a mutation to every subscriber
    ///
    /// Delivery is best-effort: with no subscribers the event is dropped.
    pub fn publish(&self, change: StoreChange) {
        let _ = self.tx.send(change);
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Decorator that broadcasts local mutations and exposes external ones
pub struct SyncStore {
    inner: Arc<dyn CredentialStore>,
    bus: ChangeBus,
}

impl SyncStore {
    /// Wrap `inner`, publishing its mutations on `bus`
    #[must_use]
    pub fn new(inner: Arc<dyn CredentialStore>, bus: ChangeBus) -> Self {
        Self { inner, bus }
    }
}

#[async_trait]
impl CredentialStore for SyncStore {
    async fn read(&self) -> Result<Option<StoredRecord>, StoreError> {
        self.inner.read().await
    }

    async fn write(&self, record: &StoredRecord) -> Result<(), StoreError> {
        self.inner.write(record).await?;
        debug!("publishing credential store update");
        self.bus.publish(StoreChange::Updated);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear().await?;
        self.bus.publish(StoreChange::Cleared);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn changes(&self) -> Option<broadcast::Receiver<StoreChange>> {
        Some(self.bus.subscribe())
    }

    fn close(&self) {
        self.inner.close();
    }
}
