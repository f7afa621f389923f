//! Single-flight coordination
//!
//! Guarantees at most one in-flight execution of an operation system-wide:
//! the first caller installs a shared pending-operation handle, every caller
//! arriving before it settles receives the same handle, and the slot is
//! cleared when the operation settles so the next distinct request starts
//! fresh. The manager uses this for refresh coordination; callers never
//! trigger redundant exchange round-trips.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

/// A shared handle to one in-flight operation
pub type Flight<T> = Shared<BoxFuture<'static, T>>;

/// At-most-one in-flight execution, shared by all concurrent requesters
pub struct SingleFlight<T: Clone> {
    slot: Arc<Mutex<Option<Flight<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    /// Create an idle coordinator
    #[must_use]
    pub fn new() -> Self {
        Self { slot: Arc::new(Mutex::new(None)) }
    }

    /// Join the in-flight operation, or start one with `make`
    ///
    /// Returns the shared handle and whether this call started the flight.
    /// The slot is cleared from within the flight itself, before any waiter
    /// observes the settled value, so a late joiner can never adopt an
    /// already-settled handle.
    pub fn enroll<F, Fut>(&self, make: F) -> (Flight<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(flight) = slot.as_ref() {
            return (flight.clone(), false);
        }

        let occupied = Arc::clone(&self.slot);
        let operation = make();
        let flight = async move {
            let outcome = operation.await;
            occupied.lock().take();
            outcome
        }
        .boxed()
        .shared();

        *slot = Some(flight.clone());
        (flight, true)
    }

    /// Whether an operation is currently in flight
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for single_flight.
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    /// Validates the concurrent-enrollment scenario.
    ///
    /// Assertions:
    /// - Confirms the operation body runs exactly once for many concurrent
    ///   enrollments.
    /// - Confirms every enroller resolves with the same outcome.
    #[tokio::test]
    async fn test_concurrent_enrollments_share_one_execution() {
        let coordinator = Arc::new(SingleFlight::<u32>::new());
        let executions = Arc::new(AtomicU32::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let coordinator = coordinator.clone();
            let executions = executions.clone();
            tasks.push(tokio::spawn(async move {
                let (flight, _) = coordinator.enroll(move || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    42
                });
                flight.await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), 42);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    /// Validates the settle-then-restart scenario.
    ///
    /// Assertions:
    /// - Ensures the slot clears once the flight settles.
    /// - Ensures a later enrollment starts a fresh execution.
    #[tokio::test]
    async fn test_next_request_after_settle_starts_fresh() {
        let coordinator = SingleFlight::<u32>::new();
        let executions = Arc::new(AtomicU32::new(0));

        for expected in 1..=2 {
            let counter = executions.clone();
            let (flight, started) = coordinator.enroll(move || async move {
                counter.fetch_add(1, Ordering::SeqCst)
            });
            assert!(started);
            flight.await;
            assert!(!coordinator.in_flight());
            assert_eq!(executions.load(Ordering::SeqCst), expected);
        }
    }

    /// Validates the joiner-flag scenario.
    ///
    /// Assertions:
    /// - Confirms only the first enroller reports having started the flight.
    #[tokio::test]
    async fn test_joiners_do_not_start() {
        let coordinator = SingleFlight::<u32>::new();

        let (first, started_first) =
            coordinator.enroll(|| async { tokio::time::sleep(Duration::from_millis(20)).await; 7 });
        let (second, started_second) = coordinator.enroll(|| async { 0 });

        assert!(started_first);
        assert!(!started_second);
        assert_eq!(first.await, 7);
        assert_eq!(second.await, 7);
    }
}
