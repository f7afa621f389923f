//! Durable credential store
//!
//! File-backed record under a host-supplied directory; survives process
//! restart and can be shared by multiple same-host execution contexts.
//! Availability is probed once at construction: if the directory cannot be
//! created the store behaves like empty storage from then on, so
//! authentication degrades to in-memory-only rather than failing.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{decode_record, encode_record, CredentialStore};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::types::{StoredRecord, RECORD_KEY};

/// Store backed by a file that survives process restart
pub struct DurableStore {
    path: PathBuf,
    available: bool,
    clock: Arc<dyn Clock>,
}

impl DurableStore {
    /// Create a durable store rooted at `dir`
    ///
    /// The record lives at `<dir>/<RECORD_KEY>.cred`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let dir = dir.into();
        let available = match std::fs::create_dir_all(&dir) {
            Ok(()) => true,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "durable storage unavailable");
                false
            }
        };

        Self { path: dir.join(format!("{RECORD_KEY}.cred")), available, clock }
    }
}

#[async_trait]
impl CredentialStore for DurableStore {
    async fn read(&self) -> Result<Option<StoredRecord>, StoreError> {
        if !self.available {
            return Err(StoreError::Unavailable);
        }

        let blob = match tokio::fs::read_to_string(&self.path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        match decode_record(&blob, self.clock.now()) {
            Some(record) => Ok(Some(record)),
            None => {
                // Lazy eviction; a racing sibling may already have removed it
                debug!(path = %self.path.display(), "evicting stale durable credential record");
                let _ = tokio::fs::remove_file(&self.path).await;
                Ok(None)
            }
        }
    }

    async fn write(&self, record: &StoredRecord) -> Result<(), StoreError> {
        if !self.available {
            return Err(StoreError::Unavailable);
        }

        let blob = encode_record(record)?;
        tokio::fs::write(&self.path, blob).await.map_err(|e| StoreError::Io(e.to_string()))?;
        debug!(path = %self.path.display(), "durable credential record written");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        if !self.available {
            return Err(StoreError::Unavailable);
        }

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for store::durable.
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::clock::MockClock;
    use crate::types::Credential;

    fn record_expiring_in(seconds: i64, now: chrono::DateTime<Utc>) -> StoredRecord {
        StoredRecord {
            credential: Credential {
                token: "durable_token".to_string(),
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(seconds),
            },
            principal: Some(serde_json::json!({ "user": "quarry@example.com" })),
        }
    }

    /// Validates the restart-survival scenario.
    ///
    /// Assertions:
    /// - Confirms a record written by one store instance reads back from a
    ///   fresh instance rooted at the same directory.
    #[tokio::test]
    async fn test_record_survives_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(MockClock::new());
        let record = record_expiring_in(3600, clock.now());

        let first = DurableStore::new(dir.path(), clock.clone());
        first.write(&record).await.unwrap();
        drop(first);

        let second = DurableStore::new(dir.path(), clock.clone());
        assert_eq!(second.read().await.unwrap(), Some(record));
    }

    /// Validates the expired-file eviction scenario.
    ///
    /// Assertions:
    /// - Ensures an expired record reads as absent and its file is removed.
    #[tokio::test]
    async fn test_expired_file_is_removed_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(MockClock::new());
        let store = DurableStore::new(dir.path(), clock.clone());

        store.write(&record_expiring_in(60, clock.now())).await.unwrap();
        clock.advance(Duration::from_secs(120));

        assert_eq!(store.read().await.unwrap(), None);
        assert!(!store.path.exists());
    }

    /// Validates the corrupted-file scenario.
    ///
    /// Assertions:
    /// - Ensures unreadable file contents read as absent, not as an error.
    #[tokio::test]
    async fn test_corrupted_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(MockClock::new());
        let store = DurableStore::new(dir.path(), clock.clone());

        tokio::fs::write(&store.path, "definitely not base64 json").await.unwrap();
        assert_eq!(store.read().await.unwrap(), None);
    }

    /// Validates the unavailable-directory scenario.
    ///
    /// Assertions:
    /// - Ensures a store rooted under a regular file reports unavailable
    ///   and returns `Unavailable` from every operation.
    #[tokio::test]
    async fn test_unavailable_directory_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, "file, not a directory").await.unwrap();

        let clock = Arc::new(MockClock::new());
        let store = DurableStore::new(blocker.join("nested"), clock.clone());

        assert!(!store.is_available());
        assert!(matches!(store.read().await, Err(StoreError::Unavailable)));
        assert!(matches!(
            store.write(&record_expiring_in(3600, clock.now())).await,
            Err(StoreError::Unavailable)
        ));
        assert!(matches!(store.clear().await, Err(StoreError::Unavailable)));
    }

    /// Validates the idempotent-clear scenario.
    ///
    /// Assertions:
    /// - Ensures clearing an empty store succeeds.
    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::new(dir.path(), Arc::new(MockClock::new()));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
    }
}
