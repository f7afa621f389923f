//! Pure validity predicates over a credential and a point in time
//!
//! No side effects, no I/O. Every predicate takes the current time as an
//! argument so callers can evaluate them against any [`crate::Clock`].

use chrono::{DateTime, Utc};

use crate::types::Credential;

/// Whether the credential has expired: `now >= expires_at`
#[must_use]
pub fn is_expired(credential: &Credential, now: DateTime<Utc>) -> bool {
    now >= credential.expires_at
}

/// Whether the credential is still usable: `now < expires_at`
#[must_use]
pub fn is_valid(credential: &Credential, now: DateTime<Utc>) -> bool {
    now < credential.expires_at
}

/// Whether the credential is inside the proactive-refresh window
///
/// True iff `now >= expires_at - threshold`. The boundary is inclusive: a
/// call landing exactly on `expires_at - threshold` triggers a refresh.
#[must_use]
pub fn should_refresh(
    credential: &Credential,
    now: DateTime<Utc>,
    threshold: chrono::Duration,
) -> bool {
    now >= credential.expires_at - threshold
}
