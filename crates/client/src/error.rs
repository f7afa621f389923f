//! Error type for the HTTP consumer boundary

use thiserror::Error;

/// Error type for [`crate::ApiClient`] operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connection, timeout, TLS)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service rejected the credential and the one permitted retry
    /// could not recover
    #[error("unauthorized: credential rejected and not recoverable")]
    Unauthorized,

    /// The response body could not be decoded as the expected shape
    #[error("response decode failed: {0}")]
    Decode(String),
}
