//! Traits at the manager's seams
//!
//! These traits enable dependency injection and testing by abstracting the
//! external collaborators: the remote credential exchange and, outward, the
//! request pipeline's view of the manager.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::types::ExchangeResponse;

/// The injected "perform credential exchange" callback
///
/// The same callback backs `login` and `refresh`: the remote service does
/// not expose a distinct refresh grant, so the core never assumes one
/// exists. If a deployment's backend does offer a refresh-token grant, the
/// callback encapsulates that choice; the manager passes the prior token
/// when it has one and otherwise calls with `None`.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    /// Exchange for a fresh credential
    ///
    /// # Arguments
    /// * `prior_token` - The token being replaced, if a refresh; `None` on
    ///   initial login
    ///
    /// # Errors
    /// Returns [`AuthError::Exchange`] when the remote login call rejects.
    /// The manager never retries a failed exchange beyond its configured
    /// attempt budget (default: one attempt, fail-fast).
    async fn exchange(&self, prior_token: Option<&str>) -> Result<ExchangeResponse, AuthError>;
}

#[async_trait]
impl<T: CredentialExchange + ?Sized> CredentialExchange for Arc<T> {
    async fn exchange(&self, prior_token: Option<&str>) -> Result<ExchangeResponse, AuthError> {
        (**self).exchange(prior_token).await
    }
}

/// The manager surface a request pipeline consumes
///
/// Attach the returned token as a bearer credential when present; on an
/// authorization rejection, `invalidate` once and retry the request after a
/// fresh `get_valid_token` call, never more than once per original request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Get a currently valid bearer token, if one is available
    ///
    /// Never fails for expected conditions (no credential, expired
    /// credential); those yield `None`.
    async fn get_valid_token(&self) -> Option<String>;

    /// Drop the cached credential after the remote service rejected it
    async fn invalidate(&self);
}
