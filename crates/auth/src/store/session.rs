//! Session-scoped credential store
//!
//! Backed by a process-wide map, so every manager instance created in the
//! same hosting session observes the same record. The map lives exactly as
//! long as the process; nothing is persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use super::{decode_record, encode_record, CredentialStore};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::types::{StoredRecord, RECORD_KEY};

static SESSION_SLOTS: Lazy<Mutex<HashMap<String, String>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Store scoped to the hosting session (the process)
pub struct SessionStore {
    key: String,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a session store under the fixed versioned record key
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_key(RECORD_KEY, clock)
    }

    /// Create a session store under an explicit key
    ///
    /// Separate keys isolate unrelated managers sharing one process.
    #[must_use]
    pub fn with_key(key: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self { key: key.into(), clock }
    }
}

#[async_trait]
impl CredentialStore for SessionStore {
    async fn read(&self) -> Result<Option<StoredRecord>, StoreError> {
        let mut slots = SESSION_SLOTS.lock();
        let Some(blob) = slots.get(&self.key) else {
            return Ok(None);
        };

        match decode_record(blob, self.clock.now()) {
            Some(record) => Ok(Some(record)),
            None => {
                debug!(key = %self.key, "evicting stale session credential record");
                slots.remove(&self.key);
                Ok(None)
            }
        }
    }

    async fn write(&self, record: &StoredRecord) -> Result<(), StoreError> {
        let blob = encode_record(record)?;
        SESSION_SLOTS.lock().insert(self.key.clone(), blob);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        SESSION_SLOTS.lock().remove(&self.key);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for store::session.
    use chrono::Utc;

    use super::*;
    use crate::clock::MockClock;
    use crate::types::Credential;

    fn unique_key() -> String {
        format!("quarry.auth.test.{}", uuid::Uuid::new_v4())
    }

    fn sample_record(now: chrono::DateTime<Utc>) -> StoredRecord {
        StoredRecord {
            credential: Credential {
                token: "session_token".to_string(),
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(3600),
            },
            principal: None,
        }
    }

    /// Validates the shared-session scenario.
    ///
    /// Assertions:
    /// - Confirms a record written by one instance reads back from a
    ///   second instance using the same key.
    #[tokio::test]
    async fn test_instances_share_session_slot() {
        let clock = Arc::new(MockClock::new());
        let key = unique_key();
        let writer = SessionStore::with_key(&key, clock.clone());
        let reader = SessionStore::with_key(&key, clock.clone());

        let record = sample_record(clock.now());
        writer.write(&record).await.unwrap();

        assert_eq!(reader.read().await.unwrap(), Some(record));

        writer.clear().await.unwrap();
        assert_eq!(reader.read().await.unwrap(), None);
    }

    /// Validates the key-isolation scenario.
    ///
    /// Assertions:
    /// - Ensures stores under different keys never observe each other.
    #[tokio::test]
    async fn test_distinct_keys_are_isolated() {
        let clock = Arc::new(MockClock::new());
        let a = SessionStore::with_key(unique_key(), clock.clone());
        let b = SessionStore::with_key(unique_key(), clock.clone());

        a.write(&sample_record(clock.now())).await.unwrap();

        assert!(a.read().await.unwrap().is_some());
        assert!(b.read().await.unwrap().is_none());

        a.clear().await.unwrap();
    }
}
