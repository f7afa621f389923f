//! HTTP consumer boundary for the Quarry client SDK.
//!
//! Bridges [`quarry_auth`] and the remote service: an [`ApiClient`] pulls a
//! bearer credential from any [`TokenSource`] (normally an
//! `AuthManager`), attaches it to outgoing requests, and drives the
//! invalidate-and-retry-once pipeline when the service answers 401.
//!
//! Entity schemas and per-resource CRUD wrappers are deliberately not
//! modeled here; callers work with JSON values or their own serde types.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

mod client;
mod error;

pub use client::ApiClient;
pub use error::ClientError;
pub use quarry_auth::TokenSource;
