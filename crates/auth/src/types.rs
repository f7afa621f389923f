//! Credential and authentication state types
//!
//! Defines the data model shared by the store backends and the manager:
//! the bearer [`Credential`], the opaque [`Principal`], the observable
//! [`AuthState`] snapshot, the persisted [`StoredRecord`], and the
//! [`RefreshPolicy`] configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed, versioned storage key for the persisted credential record
///
/// Distinct from every other SDK-managed key so unrelated persisted state
/// can never collide with it.
pub const RECORD_KEY: &str = "quarry.auth.credentials.v1";

/// Opaque identity payload returned alongside a credential
///
/// Attached to [`AuthState`] for observability only; the core never
/// interprets its contents.
pub type Principal = serde_json::Value;

/// A bearer token with its issue and expiry timestamps
///
/// Immutable once created: a refresh produces a new `Credential`, never
/// mutates an old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for API authentication
    pub token: String,

    /// When the credential was issued (UTC)
    pub issued_at: DateTime<Utc>,

    /// Absolute expiration timestamp (UTC)
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from an exchange response at the given time
    ///
    /// The expiry is computed as `now + expires_in`; the exchange callback
    /// only reports a relative lifetime.
    #[must_use]
    pub fn from_exchange(response: &ExchangeResponse, now: DateTime<Utc>) -> Self {
        Self {
            token: response.token.clone(),
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(response.expires_in),
        }
    }
}

/// Response from the injected credential exchange callback
///
/// The same callback backs both `login` and `refresh`: the remote service
/// does not expose a distinct refresh grant, so the callback encapsulates
/// whatever exchange mechanism the deployment has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResponse {
    /// Bearer token issued by the remote login call
    pub token: String,

    /// Token lifetime in seconds
    pub expires_in: i64,

    /// Optional identity payload issued with the token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
}

/// Observable authentication state
///
/// Single source of truth, mutated only by the manager. External readers
/// always receive a clone, so subscribers cannot corrupt internal state.
///
/// Invariant: `is_authenticated` is true iff a non-expired credential was
/// present when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthState {
    /// Current credential, if any
    pub credential: Option<Credential>,

    /// Identity payload from the last successful exchange
    pub principal: Option<Principal>,

    /// Whether a non-expired credential is present
    pub is_authenticated: bool,

    /// Whether a coordinated refresh is in flight
    pub is_refreshing: bool,

    /// Message from the most recent failed operation, if any
    pub last_error: Option<String>,
}

impl AuthState {
    /// The terminal logged-out state
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::default()
    }
}

/// The serialized `{ credential, principal }` pair persisted by a store
///
/// A record whose embedded credential is expired is treated as absent by
/// every read path (lazy eviction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Persisted credential
    pub credential: Credential,

    /// Persisted identity payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
}

/// Refresh behavior configuration
///
/// Defaults: refresh 5 minutes before expiry, exactly one exchange attempt
/// per refresh (fail-fast, so a real authentication problem is never masked
/// as a transient one), no retry delay.
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    /// Refresh proactively once `now >= expires_at - refresh_threshold`
    pub refresh_threshold: chrono::Duration,

    /// Maximum exchange attempts per coordinated refresh
    pub max_refresh_attempts: u32,

    /// Delay between attempts; unused at the default of one attempt
    pub retry_delay: std::time::Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            refresh_threshold: chrono::Duration::minutes(5),
            max_refresh_attempts: 1,
            retry_delay: std::time::Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for types.
    use super::*;

    fn sample_response() -> ExchangeResponse {
        ExchangeResponse {
            token: "token_123".to_string(),
            expires_in: 3600,
            principal: Some(serde_json::json!({ "user": "quarry@example.com" })),
        }
    }

    /// Validates `Credential::from_exchange` behavior for the credential
    /// creation scenario.
    ///
    /// Assertions:
    /// - Confirms `credential.token` equals `"token_123"`.
    /// - Confirms `credential.issued_at` equals `now`.
    /// - Confirms `credential.expires_at` equals `now + 3600s`.
    #[test]
    fn test_credential_from_exchange() {
        let now = Utc::now();
        let credential = Credential::from_exchange(&sample_response(), now);

        assert_eq!(credential.token, "token_123");
        assert_eq!(credential.issued_at, now);
        assert_eq!(credential.expires_at, now + chrono::Duration::seconds(3600));
    }

    /// Validates `AuthState::unauthenticated` behavior for the terminal state
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures every field reports the logged-out value.
    #[test]
    fn test_unauthenticated_state() {
        let state = AuthState::unauthenticated();

        assert!(state.credential.is_none());
        assert!(state.principal.is_none());
        assert!(!state.is_authenticated);
        assert!(!state.is_refreshing);
        assert!(state.last_error.is_none());
    }

    /// Validates `RefreshPolicy::default` behavior for the policy defaults
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the threshold equals five minutes.
    /// - Confirms `max_refresh_attempts` equals `1`.
    #[test]
    fn test_refresh_policy_defaults() {
        let policy = RefreshPolicy::default();

        assert_eq!(policy.refresh_threshold, chrono::Duration::minutes(5));
        assert_eq!(policy.max_refresh_attempts, 1);
        assert_eq!(policy.retry_delay, std::time::Duration::ZERO);
    }

    /// Validates `StoredRecord` serialization for the record roundtrip
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the deserialized record equals the original.
    #[test]
    fn test_stored_record_serde_roundtrip() {
        let now = Utc::now();
        let record = StoredRecord {
            credential: Credential::from_exchange(&sample_response(), now),
            principal: Some(serde_json::json!({ "user": "quarry@example.com" })),
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: StoredRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back, record);
    }
}
