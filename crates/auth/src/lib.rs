//! Credential lifecycle management for the Quarry client SDK.
//!
//! Hosts authenticate against a remote service once, then let this crate
//! keep the credential alive: validity is judged against an injected clock,
//! refreshes run proactively before expiry and are single-flighted so the
//! remote exchange is never hit redundantly, and the credential is
//! persisted through pluggable storage backends so sibling execution
//! contexts and process restarts pick it up without a fresh login.
//!
//! # Architecture
//!
//! ```text
//!                      ┌───────────────────┐
//!   host login UI ───▶ │    AuthManager    │ ◀─── request pipeline
//!                      │  (AuthState, subs) │      (TokenSource)
//!                      └─┬───────┬───────┬─┘
//!                        │       │       │
//!            ┌───────────▼─┐ ┌───▼────┐ ┌▼──────────────────┐
//!            │ SingleFlight│ │validity│ │  CredentialStore  │
//!            │  (refresh)  │ │ (Clock)│ │ memory | session  │
//!            └───────┬─────┘ └────────┘ │ durable (+ sync,  │
//!                    │                   │   cleanup)        │
//!            ┌───────▼──────────┐       └───────────────────┘
//!            │CredentialExchange│
//!            │ (host callback)  │
//!            └──────────────────┘
//! ```
//!
//! The exchange callback is the only piece the host must supply; everything
//! else is configured through [`AuthConfig`].
//!
//! # Example
//!
//! ```no_run
//! use quarry_auth::{AuthConfig, AuthManager, CredentialExchange};
//! # use quarry_auth::{AuthError, ExchangeResponse};
//! # struct MyExchange;
//! # #[async_trait::async_trait]
//! # impl CredentialExchange for MyExchange {
//! #     async fn exchange(
//! #         &self,
//! #         _prior: Option<&str>,
//! #     ) -> Result<ExchangeResponse, AuthError> {
//! #         unimplemented!()
//! #     }
//! # }
//!
//! # async fn run() -> Result<(), AuthError> {
//! let manager = AuthManager::with_config(MyExchange, AuthConfig::default());
//! manager.login().await?;
//!
//! if let Some(token) = manager.get_valid_token().await {
//!     // attach `token` as a bearer credential
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod clock;
pub mod error;
pub mod manager;
pub mod single_flight;
pub mod store;
pub mod testing;
pub mod traits;
pub mod types;
pub mod validity;

pub use clock::{Clock, MockClock, SystemClock};
pub use error::{AuthError, StoreError};
pub use manager::{AuthConfig, AuthManager, Subscription};
pub use single_flight::SingleFlight;
pub use store::{
    build_store, ChangeBus, CleanupStore, CredentialStore, DurableStore, MemoryStore, SessionStore,
    StorageBackend, StoreChange, StoreOptions, SyncStore,
};
pub use traits::{CredentialExchange, TokenSource};
pub use types::{
    AuthState, Credential, ExchangeResponse, Principal, RefreshPolicy, StoredRecord, RECORD_KEY,
};
