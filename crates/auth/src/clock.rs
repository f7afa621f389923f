//! Time source abstraction for testability
//!
//! Credential validity is always judged against an injected clock so the
//! predicates in [`crate::validity`] and the manager's scheduling decisions
//! can be tested deterministically without real time passing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Trait for wall-clock time operations
///
/// Production code uses [`SystemClock`]; tests inject [`MockClock`] and
/// advance it manually.
pub trait Clock: Send + Sync {
    /// Get the current wall-clock time (UTC)
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock implementation
///
/// Use this in production code.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing
///
/// Starts at the current real time and only moves when advanced manually.
/// Clones share the same elapsed time, so a clock handed to a manager can
/// still be advanced from the test body.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use quarry_auth::{Clock, MockClock};
///
/// let clock = MockClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!((clock.now() - start).num_seconds(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    base: DateTime<Utc>,
    elapsed: Arc<Mutex<chrono::Duration>>,
}

impl MockClock {
    /// Create a new mock clock anchored at the current real time
    #[must_use]
    pub fn new() -> Self {
        Self { base: Utc::now(), elapsed: Arc::new(Mutex::new(chrono::Duration::zero())) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        *self.elapsed.lock() += delta;
    }

    /// Set the mock clock to an absolute elapsed time since creation
    pub fn set_elapsed(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        *self.elapsed.lock() = delta;
    }

    /// Get the simulated elapsed time since creation
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + *self.elapsed.lock()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for clock.
    use super::*;

    /// Validates the system clock scenario.
    ///
    /// Assertions:
    /// - Ensures `now2 >= now1` evaluates to true.
    #[test]
    fn test_system_clock() {
        let clock = SystemClock;
        let now1 = clock.now();
        let now2 = clock.now();

        assert!(now2 >= now1);
    }

    /// Validates `MockClock::new` behavior for the advance scenario.
    ///
    /// Assertions:
    /// - Confirms `(after - start).num_seconds()` equals `5`.
    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(5));
        let after = clock.now();

        assert_eq!((after - start).num_seconds(), 5);
    }

    /// Validates `MockClock::new` behavior for the set elapsed scenario.
    ///
    /// Assertions:
    /// - Confirms `clock.elapsed()` equals ten seconds.
    /// - Confirms `clock.elapsed()` equals twenty seconds after overwrite.
    #[test]
    fn test_mock_clock_set_elapsed() {
        let clock = MockClock::new();

        clock.set_elapsed(Duration::from_secs(10));
        assert_eq!(clock.elapsed(), chrono::Duration::seconds(10));

        clock.set_elapsed(Duration::from_secs(20));
        assert_eq!(clock.elapsed(), chrono::Duration::seconds(20));
    }

    /// Validates `MockClock::new` behavior for the clone scenario.
    ///
    /// Assertions:
    /// - Confirms cloned clocks share the same elapsed time.
    #[test]
    fn test_mock_clock_clone_shares_elapsed() {
        let clock1 = MockClock::new();
        clock1.advance(Duration::from_secs(10));

        let clock2 = clock1.clone();
        assert_eq!(clock2.elapsed(), chrono::Duration::seconds(10));

        clock1.advance(Duration::from_secs(5));
        assert_eq!(clock2.elapsed(), chrono::Duration::seconds(15));
    }
}
