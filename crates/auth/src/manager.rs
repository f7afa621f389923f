//! Authentication manager
//!
//! The orchestrator: owns the current [`AuthState`], exposes login, logout,
//! token retrieval, refresh, and state-change subscription, and composes
//! the validity predicates, a [`CredentialStore`], the single-flight
//! refresh coordinator, and the injected [`CredentialExchange`] callback.
//!
//! State machine: `Unauthenticated → Authenticating → Authenticated →
//! Refreshing → Authenticated | Unauthenticated`. All mutations happen on
//! the manager; external readers only ever receive snapshot clones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use crate::single_flight::SingleFlight;
use crate::store::{build_store, ChangeBus, CredentialStore, StorageBackend, StoreChange, StoreOptions};
use crate::traits::{CredentialExchange, TokenSource};
use crate::types::{AuthState, Credential, RefreshPolicy, StoredRecord};
use crate::validity;

type Listener = Arc<dyn Fn(&AuthState) + Send + Sync>;
type ListenerRegistry = Arc<Mutex<Vec<(u64, Listener)>>>;

/// Construction-time configuration
///
/// The storage backend is resolved exactly once, here, rather than probed
/// ad hoc inside each operation.
#[derive(Default)]
pub struct AuthConfig {
    /// Refresh thresholds and attempt budget
    pub policy: RefreshPolicy,

    /// Persistence backend variant
    pub backend: StorageBackend,

    /// Arm the cleanup decorator with this sweep interval
    pub cleanup_interval: Option<Duration>,

    /// Attach the cross-context sync decorator to this bus
    pub change_bus: Option<ChangeBus>,
}

/// Registration handle returned by [`AuthManager::on_auth_state_change`]
///
/// Call [`Subscription::unsubscribe`] to stop receiving snapshots. Dropping
/// the handle without unsubscribing leaves the listener registered for the
/// manager's lifetime.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Vec<(u64, Listener)>>>,
}

impl Subscription {
    /// Remove the listener from the registry
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

struct ManagerInner<E> {
    exchange: E,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    policy: RefreshPolicy,
    state: Mutex<AuthState>,
    // Held across mutation + notification so snapshots are delivered in
    // mutation order
    notify_order: Mutex<()>,
    listeners: ListenerRegistry,
    next_listener_id: AtomicU64,
    refresh: SingleFlight<Result<Credential, AuthError>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
    // Bumped on logout/destroy; a refresh that settles under a stale
    // generation discards its result instead of resurrecting the session
    generation: AtomicU64,
}

/// Orchestrates the credential lifecycle
///
/// Cloning is cheap and shares the same underlying state; every component
/// that needs a valid token receives an `AuthManager` (or a
/// [`TokenSource`]) reference rather than reading a process-wide singleton,
/// so independently-configured instances can coexist.
pub struct AuthManager<E: CredentialExchange + 'static> {
    inner: Arc<ManagerInner<E>>,
}

impl<E: CredentialExchange + 'static> Clone for AuthManager<E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: CredentialExchange + 'static> AuthManager<E> {
    /// Create a manager from explicit collaborators
    #[must_use]
    pub fn new(
        exchange: E,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        policy: RefreshPolicy,
    ) -> Self {
        let inner = Arc::new(ManagerInner {
            exchange,
            store,
            clock,
            policy,
            state: Mutex::new(AuthState::unauthenticated()),
            notify_order: Mutex::new(()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
            refresh: SingleFlight::new(),
            timer: Mutex::new(None),
            sync_task: Mutex::new(None),
            generation: AtomicU64::new(0),
        });

        if let Some(rx) = inner.store.changes() {
            spawn_sync_task(&inner, rx);
        }

        Self { inner }
    }

    /// Create a manager from configuration, resolving the storage backend
    /// and decorators once
    #[must_use]
    pub fn with_config(exchange: E, config: AuthConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = build_store(
            &config.backend,
            StoreOptions {
                cleanup_interval: config.cleanup_interval,
                change_bus: config.change_bus,
            },
            clock.clone(),
        );
        Self::new(exchange, store, clock, config.policy)
    }

    /// Perform an explicit login via the exchange callback
    ///
    /// Exactly one exchange attempt, no retry. Success persists the
    /// credential, notifies subscribers, and (re)arms the proactive-refresh
    /// timer. Failure clears any stored credential and records the error on
    /// the state.
    ///
    /// # Errors
    /// Returns the exchange failure unchanged; by then the manager is back
    /// in the unauthenticated state.
    pub async fn login(&self) -> Result<AuthState, AuthError> {
        let inner = &self.inner;
        info!("starting credential exchange");

        match inner.exchange.exchange(None).await {
            Ok(response) => {
                let now = inner.clock.now();
                let credential = Credential::from_exchange(&response, now);
                let record = StoredRecord {
                    credential: credential.clone(),
                    principal: response.principal.clone(),
                };
                if let Err(e) = inner.store.write(&record).await {
                    warn!(error = %e, "credential store write failed; continuing in memory only");
                }
                inner.mutate(|st| {
                    st.credential = Some(credential.clone());
                    st.principal = response.principal.clone();
                    st.is_authenticated = true;
                    st.is_refreshing = false;
                    st.last_error = None;
                });
                arm_timer(inner, credential.expires_at);
                info!("login completed");
                Ok(self.auth_state())
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(se) = inner.store.clear().await {
                    warn!(error = %se, "credential store clear failed after login failure");
                }
                inner.cancel_timer();
                inner.mutate(|st| {
                    *st = AuthState { last_error: Some(message.clone()), ..AuthState::unauthenticated() };
                });
                warn!(error = %message, "login failed");
                Err(e)
            }
        }
    }

    /// Get a currently valid bearer token, if one is available
    ///
    /// Never performs an implicit first login; only [`AuthManager::login`]
    /// does. A cache miss triggers one store read (covering a credential
    /// another context already derived); an expired credential is dropped
    /// from memory and storage; a credential inside the proactive-refresh
    /// window is refreshed before returning, and the caller observes the
    /// post-refresh state.
    pub async fn get_valid_token(&self) -> Option<String> {
        let inner = &self.inner;

        let cached = inner.state.lock().credential.clone();
        let credential = match cached {
            Some(credential) => credential,
            None => inner.adopt_from_store().await?,
        };

        let now = inner.clock.now();
        if validity::is_expired(&credential, now) {
            debug!("cached credential expired");
            inner.drop_expired().await;
            return None;
        }
        if validity::should_refresh(&credential, now, inner.policy.refresh_threshold) {
            // Refresh failure has already been recorded on the state; this
            // caller just observes the absence
            return coordinate_refresh(inner).await.ok().map(|fresh| fresh.token);
        }

        Some(credential.token)
    }

    /// Refresh the credential through the single-flight coordinator
    ///
    /// All callers arriving during an in-flight refresh await the same
    /// outcome; the exchange callback is invoked at most once per flight.
    ///
    /// # Errors
    /// Returns [`AuthError::RefreshFailed`] when the coordinated attempt
    /// fails; the manager is then fully logged out, never left in partial
    /// state.
    pub async fn refresh_token(&self) -> Result<Credential, AuthError> {
        coordinate_refresh(&self.inner).await
    }

    /// Log out: clear in-memory state, cancel the scheduled refresh, clear
    /// the store
    ///
    /// Idempotent: a second call is a no-op and emits no extra snapshot.
    pub async fn logout(&self) {
        let inner = &self.inner;
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.cancel_timer();
        if let Err(e) = inner.store.clear().await {
            warn!(error = %e, "credential store clear failed during logout");
        }
        if inner.mutate(|st| *st = AuthState::unauthenticated()) {
            info!("logged out");
        }
    }

    /// Drop the cached credential after the remote service rejected it
    ///
    /// The persisted copy is removed only if it still holds the rejected
    /// token, so a newer credential written by a sibling context survives
    /// and the next [`AuthManager::get_valid_token`] call can adopt it.
    pub async fn invalidate(&self) {
        let inner = &self.inner;
        let rejected = inner.state.lock().credential.as_ref().map(|c| c.token.clone());
        let Some(rejected) = rejected else { return };

        inner.cancel_timer();
        inner.mutate(|st| {
            st.credential = None;
            st.principal = None;
            st.is_authenticated = false;
        });

        match inner.store.read().await {
            Ok(Some(record)) if record.credential.token == rejected => {
                if let Err(e) = inner.store.clear().await {
                    warn!(error = %e, "credential store clear failed during invalidation");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "credential store read failed during invalidation"),
        }
    }

    /// Whether a non-expired credential is currently present
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        let inner = &self.inner;
        let now = inner.clock.now();
        inner.state.lock().credential.as_ref().is_some_and(|c| validity::is_valid(c, now))
    }

    /// Get an immutable snapshot of the current authentication state
    ///
    /// `is_authenticated` is re-evaluated against the clock at snapshot
    /// time, so a credential that expired since the last mutation reads as
    /// unauthenticated.
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        let inner = &self.inner;
        let mut snapshot = inner.state.lock().clone();
        let now = inner.clock.now();
        snapshot.is_authenticated =
            snapshot.credential.as_ref().is_some_and(|c| validity::is_valid(c, now));
        snapshot
    }

    /// Register a state-change listener
    ///
    /// The listener receives one immediate snapshot synchronously on
    /// subscribe, then one snapshot per subsequent state mutation, in
    /// mutation order. A panicking listener is isolated: it never corrupts
    /// state or starves other listeners.
    ///
    /// Delivery runs under the notification lock. A listener may
    /// [`Subscription::unsubscribe`] from inside its own callback, but it
    /// must not register a new listener there: that re-enters the
    /// notification lock and deadlocks.
    pub fn on_auth_state_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let inner = &self.inner;
        let _order = inner.notify_order.lock();

        let id = inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        inner.listeners.lock().push((id, listener.clone()));

        let snapshot = inner.state.lock().clone();
        invoke_listener(&listener, &snapshot);

        Subscription { id, registry: Arc::downgrade(&inner.listeners) }
    }

    /// Release timers and storage decorators
    ///
    /// An in-flight refresh is not forcibly cancelled; it settles and its
    /// result is discarded.
    pub fn destroy(&self) {
        let inner = &self.inner;
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.cancel_timer();
        if let Some(handle) = inner.sync_task.lock().take() {
            handle.abort();
        }
        inner.store.close();
    }
}

#[async_trait]
impl<E: CredentialExchange + 'static> TokenSource for AuthManager<E> {
    async fn get_valid_token(&self) -> Option<String> {
        Self::get_valid_token(self).await
    }

    async fn invalidate(&self) {
        Self::invalidate(self).await;
    }
}

impl<E> ManagerInner<E> {
    /// Apply a mutation and notify listeners, skipping no-op mutations
    ///
    /// Returns whether the state actually changed. The notification lock is
    /// held across mutation and delivery so snapshots arrive in mutation
    /// order; the closure must not block.
    fn mutate<F: FnOnce(&mut AuthState)>(&self, apply: F) -> bool {
        let _order = self.notify_order.lock();

        let snapshot = {
            let mut state = self.state.lock();
            let before = state.clone();
            apply(&mut state);
            if *state == before {
                return false;
            }
            state.clone()
        };

        let listeners: Vec<Listener> =
            self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in &listeners {
            invoke_listener(listener, &snapshot);
        }
        true
    }

    fn cancel_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    /// Adopt a credential another context persisted, if one exists
    async fn adopt_from_store(&self) -> Option<Credential> {
        let record = match self.store.read().await {
            Ok(record) => record?,
            Err(e) => {
                warn!(error = %e, "credential store read failed; continuing in memory only");
                return None;
            }
        };

        debug!("adopting credential from store");
        self.mutate(|st| {
            st.credential = Some(record.credential.clone());
            st.principal = record.principal.clone();
            st.is_authenticated = true;
            st.last_error = None;
        });
        Some(record.credential)
    }

    /// Drop an expired credential from memory and storage
    async fn drop_expired(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "credential store clear failed while evicting expired credential");
        }
        self.cancel_timer();
        self.mutate(|st| {
            st.credential = None;
            st.principal = None;
            st.is_authenticated = false;
        });
    }

    /// React to a storage mutation made by a sibling context
    async fn apply_external_change(&self, change: StoreChange) {
        match change {
            StoreChange::Cleared => {
                if self.mutate(|st| *st = AuthState::unauthenticated()) {
                    debug!("credential cleared by sibling context");
                }
            }
            StoreChange::Updated => {
                let record = match self.store.read().await {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(error = %e, "credential store read failed while syncing");
                        return;
                    }
                };
                if let Some(record) = record {
                    // A no-op when this context wrote the record itself
                    if self.mutate(|st| {
                        st.credential = Some(record.credential.clone());
                        st.principal = record.principal.clone();
                        st.is_authenticated = true;
                        st.last_error = None;
                    }) {
                        debug!("credential updated by sibling context");
                    }
                }
            }
        }
    }
}

fn invoke_listener(listener: &Listener, snapshot: &AuthState) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(snapshot)));
    if outcome.is_err() {
        warn!("auth state listener panicked; listener isolated");
    }
}

/// Enroll in the shared refresh flight, starting one if none is pending
async fn coordinate_refresh<E: CredentialExchange + 'static>(
    inner: &Arc<ManagerInner<E>>,
) -> Result<Credential, AuthError> {
    let generation = inner.generation.load(Ordering::SeqCst);
    let runner = Arc::clone(inner);
    let (flight, started) = inner.refresh.enroll(move || run_refresh(runner, generation));
    if started {
        inner.mutate(|st| st.is_refreshing = true);
    }
    flight.await
}

/// The single coordinated refresh attempt shared by all waiters
async fn run_refresh<E: CredentialExchange + 'static>(
    inner: Arc<ManagerInner<E>>,
    generation: u64,
) -> Result<Credential, AuthError> {
    let prior = inner.state.lock().credential.as_ref().map(|c| c.token.clone());

    let attempts = inner.policy.max_refresh_attempts.max(1);
    let mut attempt = 0;
    let outcome = loop {
        attempt += 1;
        match inner.exchange.exchange(prior.as_deref()).await {
            Ok(response) => break Ok(response),
            Err(e) if attempt < attempts => {
                warn!(error = %e, attempt, "credential exchange attempt failed; retrying");
                tokio::time::sleep(inner.policy.retry_delay).await;
            }
            Err(e) => break Err(e),
        }
    };

    if inner.generation.load(Ordering::SeqCst) != generation {
        // Logged out while the exchange was in flight; let it settle but
        // discard the result
        debug!("discarding refresh outcome from a superseded session");
        inner.mutate(|st| st.is_refreshing = false);
        return Err(AuthError::NotAuthenticated);
    }

    match outcome {
        Ok(response) => {
            let now = inner.clock.now();
            let credential = Credential::from_exchange(&response, now);
            let record =
                StoredRecord { credential: credential.clone(), principal: response.principal.clone() };
            if let Err(e) = inner.store.write(&record).await {
                warn!(error = %e, "credential store write failed; continuing in memory only");
            }
            inner.mutate(|st| {
                st.credential = Some(credential.clone());
                st.principal = response.principal.clone();
                st.is_authenticated = true;
                st.is_refreshing = false;
                st.last_error = None;
            });
            arm_timer(&inner, credential.expires_at);
            info!("credential refresh completed");
            Ok(credential)
        }
        Err(e) => {
            let message = e.to_string();
            if let Err(se) = inner.store.clear().await {
                warn!(error = %se, "credential store clear failed after refresh failure");
            }
            inner.cancel_timer();
            // Full logout semantics, never partial state
            inner.mutate(|st| {
                *st = AuthState { last_error: Some(message.clone()), ..AuthState::unauthenticated() };
            });
            error!(error = %message, "credential refresh failed");
            Err(AuthError::RefreshFailed(message))
        }
    }
}

/// (Re)arm the proactive-refresh timer to fire at `expires_at - threshold`
///
/// The previous handle is always cancelled first so two background
/// refreshes can never race each other.
fn arm_timer<E: CredentialExchange + 'static>(
    inner: &Arc<ManagerInner<E>>,
    expires_at: DateTime<Utc>,
) {
    inner.cancel_timer();

    let fire_at = expires_at - inner.policy.refresh_threshold;
    let delay = (fire_at - inner.clock.now()).to_std().unwrap_or(Duration::ZERO);
    let generation = inner.generation.load(Ordering::SeqCst);
    let weak = Arc::downgrade(inner);

    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(inner) = weak.upgrade() else { return };
        if inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        // Release our own handle before refreshing so the failure path's
        // cancel never aborts the running flight
        *inner.timer.lock() = None;

        debug!("proactive refresh timer fired");
        if let Err(e) = coordinate_refresh(&inner).await {
            // Background failure is logged, never propagated to unrelated
            // callers
            error!(error = %e, "scheduled credential refresh failed");
        }
    });

    *inner.timer.lock() = Some(handle);
}

fn spawn_sync_task<E: CredentialExchange + 'static>(
    inner: &Arc<ManagerInner<E>>,
    mut rx: broadcast::Receiver<StoreChange>,
) {
    let weak = Arc::downgrade(inner);
    let handle = tokio::spawn(async move {
        loop {
            let change = match rx.recv().await {
                Ok(change) => change,
                // Missed notifications degrade to a re-read
                Err(broadcast::error::RecvError::Lagged(_)) => StoreChange::Updated,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(inner) = weak.upgrade() else { break };
            inner.apply_external_change(change).await;
        }
    });
    *inner.sync_task.lock() = Some(handle);
}
