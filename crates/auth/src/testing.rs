//! Test doubles for exercising the manager without a remote service
//!
//! Public so downstream crates can drive an [`crate::AuthManager`] through
//! scripted exchange outcomes in their own tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::AuthError;
use crate::traits::CredentialExchange;
use crate::types::{ExchangeResponse, Principal};

/// Scripted [`CredentialExchange`] double
///
/// Outcomes are consumed in enqueue order, one per `exchange` call. Every
/// call is counted and its `prior_token` argument recorded, so tests can
/// assert both how often the remote service would have been hit and what
/// was handed to it. An optional artificial delay keeps the exchange
/// pending long enough for concurrency tests to pile up waiters.
#[derive(Default)]
pub struct MockExchange {
    script: Mutex<VecDeque<Result<ExchangeResponse, AuthError>>>,
    calls: AtomicU32,
    priors: Mutex<Vec<Option<String>>>,
    delay: Mutex<Option<Duration>>,
}

impl MockExchange {
    /// Create a mock with an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a successful exchange outcome
    pub fn enqueue_success(&self, token: &str, expires_in: i64) {
        self.script.lock().push_back(Ok(ExchangeResponse {
            token: token.to_string(),
            expires_in,
            principal: None,
        }));
    }

    /// Enqueue a successful exchange outcome carrying an identity payload
    pub fn enqueue_success_with_principal(&self, token: &str, expires_in: i64, principal: Principal) {
        self.script.lock().push_back(Ok(ExchangeResponse {
            token: token.to_string(),
            expires_in,
            principal: Some(principal),
        }));
    }

    /// Enqueue a failed exchange outcome
    pub fn enqueue_failure(&self, message: &str) {
        self.script.lock().push_back(Err(AuthError::Exchange(message.to_string())));
    }

    /// Hold every subsequent exchange pending for `delay` before settling
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// How many times `exchange` was called
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The `prior_token` argument of every call, in call order
    #[must_use]
    pub fn priors(&self) -> Vec<Option<String>> {
        self.priors.lock().clone()
    }
}

#[async_trait]
impl CredentialExchange for MockExchange {
    async fn exchange(&self, prior_token: Option<&str>) -> Result<ExchangeResponse, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.priors.lock().push(prior_token.map(str::to_string));

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Exchange("script exhausted".to_string())))
    }
}
