//! Authenticated HTTP client
//!
//! Wraps a `reqwest::Client` around a [`TokenSource`]: every request
//! carries the current bearer credential when one is available, and a 401
//! response triggers the invalidate-refetch-retry pipeline exactly once
//! per original request.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use quarry_auth::TokenSource;

use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client that authenticates requests through a [`TokenSource`]
///
/// The client never logs in by itself; an absent token simply means the
/// request goes out unauthenticated and the service answers accordingly.
/// Cloning shares the connection pool and the token source.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl ApiClient {
    /// Create a client rooted at `base_url`, authenticating via `tokens`
    ///
    /// # Errors
    /// Returns [`ClientError::Request`] if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url: base_url.into(), tokens })
    }

    /// Send a request through the authentication pipeline
    ///
    /// Attaches `Authorization: Bearer <token>` when the source yields a
    /// token. On a 401 response the cached credential is invalidated, a
    /// fresh token is fetched, and the request is retried exactly once; a
    /// second 401 (or no fresh token to retry with) surfaces as
    /// [`ClientError::Unauthorized`].
    ///
    /// # Errors
    /// Returns [`ClientError::Request`] on transport failure and
    /// [`ClientError::Unauthorized`] when the credential is rejected and
    /// the retry cannot recover. Non-401 error statuses are returned as
    /// ordinary responses for the caller to interpret.
    pub async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ClientError> {
        let token = self.tokens.get_valid_token().await;
        let response = self.send(method.clone(), path, body, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // The service rejected the credential before its local expiry
        // (revocation, clock skew). Drop it and retry once with whatever
        // the source can produce now.
        warn!(path, "request rejected as unauthorized; invalidating credential");
        self.tokens.invalidate().await;

        let Some(fresh) = self.tokens.get_valid_token().await else {
            debug!(path, "no replacement credential available; not retrying");
            return Err(ClientError::Unauthorized);
        };

        let retried = self.send(method, path, body, Some(&fresh)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        Ok(retried)
    }

    /// GET a JSON resource
    ///
    /// # Errors
    /// Propagates pipeline errors; a non-success status or an undecodable
    /// body yields [`ClientError::Decode`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.request::<()>(Method::GET, path, None).await?;
        decode_json(response).await
    }

    /// POST a JSON body and decode the JSON reply
    ///
    /// # Errors
    /// Propagates pipeline errors; a non-success status or an undecodable
    /// body yields [`ClientError::Decode`].
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.request(Method::POST, path, Some(body)).await?;
        decode_json(response).await
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let url = self.url_for(path);
        let mut builder = self.http.request(method, &url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!(%url, authenticated = token.is_some(), "sending request");
        Ok(builder.send().await?)
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Decode(format!("unexpected status {status}")));
    }
    response.json().await.map_err(|e| ClientError::Decode(e.to_string()))
}
