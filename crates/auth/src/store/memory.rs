//! In-memory credential store
//!
//! Default backend for non-persistent and server contexts. Holds the
//! encoded blob in process memory, scoped to this instance.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{decode_record, encode_record, CredentialStore};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::types::StoredRecord;

/// Ephemeral store backed by process memory
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { slot: Mutex::new(None), clock }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn read(&self) -> Result<Option<StoredRecord>, StoreError> {
        let mut slot = self.slot.lock();
        let Some(blob) = slot.as_deref() else {
            return Ok(None);
        };

        match decode_record(blob, self.clock.now()) {
            Some(record) => Ok(Some(record)),
            None => {
                // Lazy eviction: stale or malformed blobs are dropped on read
                debug!("evicting stale in-memory credential record");
                *slot = None;
                Ok(None)
            }
        }
    }

    async fn write(&self, record: &StoredRecord) -> Result<(), StoreError> {
        let blob = encode_record(record)?;
        *self.slot.lock() = Some(blob);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.slot.lock() = None;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for store::memory.
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::clock::MockClock;
    use crate::types::Credential;

    fn record_expiring_in(seconds: i64, now: chrono::DateTime<Utc>) -> StoredRecord {
        StoredRecord {
            credential: Credential {
                token: "token".to_string(),
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(seconds),
            },
            principal: None,
        }
    }

    /// Validates the write/read/clear roundtrip scenario.
    ///
    /// Assertions:
    /// - Confirms a written record reads back equal.
    /// - Ensures the store is empty after `clear`.
    #[tokio::test]
    async fn test_roundtrip_and_clear() {
        let clock = Arc::new(MockClock::new());
        let store = MemoryStore::new(clock.clone());
        let record = record_expiring_in(3600, clock.now());

        store.write(&record).await.unwrap();
        assert_eq!(store.read().await.unwrap(), Some(record));

        store.clear().await.unwrap();
        assert_eq!(store.read().await.unwrap(), None);
    }

    /// Validates the lazy eviction scenario.
    ///
    /// Assertions:
    /// - Ensures a record reads back before expiry.
    /// - Ensures the same record reads as absent after the clock passes
    ///   expiry.
    #[tokio::test]
    async fn test_expired_record_is_evicted_on_read() {
        let clock = Arc::new(MockClock::new());
        let store = MemoryStore::new(clock.clone());

        store.write(&record_expiring_in(60, clock.now())).await.unwrap();
        assert!(store.read().await.unwrap().is_some());

        clock.advance(Duration::from_secs(120));
        assert_eq!(store.read().await.unwrap(), None);
        // Eviction is permanent, not just filtered
        assert_eq!(store.read().await.unwrap(), None);
    }

    /// Validates the availability scenario.
    ///
    /// Assertions:
    /// - Ensures memory storage is always available.
    #[test]
    fn test_always_available() {
        let store = MemoryStore::new(Arc::new(MockClock::new()));
        assert!(store.is_available());
        assert!(store.changes().is_none());
    }
}
