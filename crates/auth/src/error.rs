//! Error types for credential lifecycle operations
//!
//! Two taxonomies: [`AuthError`] for exchange and refresh outcomes surfaced
//! to callers, [`StoreError`] for persistence failures. Store failures are
//! never surfaced through `get_valid_token`; the manager degrades to
//! in-memory-only operation and logs them.

use thiserror::Error;

/// Error type for authentication operations
///
/// Cloneable because a single coordinated refresh outcome is shared by every
/// concurrent waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The credential exchange callback rejected (login or refresh).
    /// Terminal for that attempt; retrying a failed exchange typically
    /// re-fails identically and masks a real authorization problem.
    #[error("credential exchange failed: {0}")]
    Exchange(String),

    /// No credential is available and none can be derived
    #[error("not authenticated")]
    NotAuthenticated,

    /// A coordinated refresh failed
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Error type for credential store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage is not available in this host environment
    #[error("storage backend unavailable")]
    Unavailable,

    /// Reading or writing the backing storage failed
    #[error("storage I/O failed: {0}")]
    Io(String),

    /// The record could not be encoded for persistence
    #[error("stored record could not be encoded: {0}")]
    Codec(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for error.
    use super::*;

    /// Validates `AuthError` display formatting.
    ///
    /// Assertions:
    /// - Ensures each variant renders its context.
    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::Exchange("invalid_grant".to_string()).to_string(),
            "credential exchange failed: invalid_grant"
        );
        assert_eq!(AuthError::NotAuthenticated.to_string(), "not authenticated");
        assert_eq!(
            AuthError::RefreshFailed("timeout".to_string()).to_string(),
            "token refresh failed: timeout"
        );
    }

    /// Validates `StoreError` display formatting.
    ///
    /// Assertions:
    /// - Ensures the unavailable variant has a stable message.
    #[test]
    fn test_store_error_display() {
        assert_eq!(StoreError::Unavailable.to_string(), "storage backend unavailable");
        assert!(StoreError::Io("denied".to_string()).to_string().contains("denied"));
    }
}
