//! Credential persistence
//!
//! A single [`CredentialStore`] contract with three interchangeable
//! backends and two decorators that compose over any backend without
//! changing the contract:
//!
//! - [`MemoryStore`]: process-memory only, per manager instance
//! - [`SessionStore`]: shared across managers for the lifetime of the
//!   hosting session (the process), then gone
//! - [`DurableStore`]: file-backed, survives process restart
//! - [`CleanupStore`]: bounds the lifetime of stale data with a periodic
//!   sweep even if nobody calls `read`
//! - [`SyncStore`]: re-broadcasts external storage mutations so sibling
//!   contexts sharing durable storage converge without polling
//!
//! All backends persist one [`StoredRecord`] under the fixed versioned key
//! [`crate::RECORD_KEY`], encoded as base64(JSON). The encoding is
//! reversible, not encrypted; persisted-token confidentiality is
//! best-effort by design. On decode, a structurally invalid or expired
//! record is treated identically to "absent" — callers never receive a
//! malformed or stale record.

mod cleanup;
mod durable;
mod memory;
mod session;
mod sync;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

pub use cleanup::CleanupStore;
pub use durable::DurableStore;
pub use memory::MemoryStore;
pub use session::SessionStore;
pub use sync::{ChangeBus, SyncStore};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::types::StoredRecord;
use crate::validity;

/// An externally observable storage mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    /// A record was written under the storage key
    Updated,
    /// The storage key was cleared
    Cleared,
}

/// Contract for credential persistence backends
///
/// Writes are last-write-wins and idempotent; re-deriving the same
/// credential is harmless, so no locking protocol beyond the manager's
/// single-flight refresh is used even when the backing storage is shared
/// across manager instances.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the current record, or `None` if absent, malformed, or expired
    async fn read(&self) -> Result<Option<StoredRecord>, StoreError>;

    /// Persist a record, replacing any existing one
    async fn write(&self, record: &StoredRecord) -> Result<(), StoreError>;

    /// Remove the persisted record, if any
    async fn clear(&self) -> Result<(), StoreError>;

    /// Whether the backing storage is usable in this host environment
    fn is_available(&self) -> bool;

    /// Subscribe to external storage mutations, when the host supports them
    ///
    /// Plain backends return `None`; [`SyncStore`] overrides this.
    fn changes(&self) -> Option<broadcast::Receiver<StoreChange>> {
        None
    }

    /// Release background resources held by decorators
    fn close(&self) {}
}

/// Backend variant selected once at construction time
///
/// Capability detection happens here, not ad hoc inside each operation: a
/// `Durable` backend that cannot create its directory is constructed
/// unavailable and behaves like empty storage from then on.
#[derive(Debug, Clone, Default)]
pub enum StorageBackend {
    /// Process-memory only, default for non-persistent contexts
    #[default]
    Memory,
    /// Cleared when the hosting session (process) ends
    Session,
    /// Survives process restart, rooted at a host-supplied directory
    Durable {
        /// Directory holding the record file
        dir: PathBuf,
    },
}

/// Optional decorators applied when resolving a backend
#[derive(Default)]
pub struct StoreOptions {
    /// Sweep interval for the cleanup decorator
    pub cleanup_interval: Option<Duration>,
    /// Host-provided change-notification bus for cross-context sync
    pub change_bus: Option<ChangeBus>,
}

/// Resolve a backend variant and compose the requested decorators
#[must_use]
pub fn build_store(
    backend: &StorageBackend,
    options: StoreOptions,
    clock: Arc<dyn Clock>,
) -> Arc<dyn CredentialStore> {
    let mut store: Arc<dyn CredentialStore> = match backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new(clock.clone())),
        StorageBackend::Session => Arc::new(SessionStore::new(clock.clone())),
        StorageBackend::Durable { dir } => Arc::new(DurableStore::new(dir.clone(), clock.clone())),
    };

    if let Some(bus) = options.change_bus {
        store = Arc::new(SyncStore::new(store, bus));
    }
    if let Some(interval) = options.cleanup_interval {
        store = Arc::new(CleanupStore::new(store, interval));
    }

    store
}

/// Encode a record as a base64(JSON) blob
pub(crate) fn encode_record(record: &StoredRecord) -> Result<String, StoreError> {
    let json = serde_json::to_vec(record).map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(BASE64.encode(json))
}

/// Decode a blob, treating malformed and expired records as absent
pub(crate) fn decode_record(blob: &str, now: DateTime<Utc>) -> Option<StoredRecord> {
    let bytes = BASE64.decode(blob.trim()).ok()?;
    let record: StoredRecord = serde_json::from_slice(&bytes).ok()?;
    if validity::is_expired(&record.credential, now) {
        return None;
    }
    Some(record)
}
