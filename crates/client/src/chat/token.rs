//! OAuth bearer token acquisition for the Chat APIs.
//!
//! Tokens are fetched with the `client_credentials` grant and cached through
//! a pluggable [`TokenStore`]. Acquisition is serialized behind a mutex with
//! a double-check, so concurrent cache misses cost one token request, not N.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::auth::ChatCredentials;
use crate::error::Error;
use crate::transport::client::read_classified;

/// A bearer token as returned by the OAuth token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BearerToken {
    /// The raw access token. May be empty when the endpoint misbehaves;
    /// callers reject empty tokens rather than sending blank credentials.
    pub access_token: String,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: String,
    /// Granted scopes.
    #[serde(default)]
    pub scope: String,
}

/// Storage backend for the cached chat token.
///
/// The default [`InMemoryTokenStore`] keeps the token in process memory;
/// implement this to share a token across processes or survive restarts.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns the cached token, if any.
    async fn get(&self) -> Option<BearerToken>;
    /// Replaces the cached token.
    async fn set(&self, token: BearerToken);
    /// Drops the cached token.
    async fn clear(&self);
}

/// Process-local token cache.
#[derive(Default)]
pub struct InMemoryTokenStore {
    token: RwLock<Option<BearerToken>>,
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self) -> Option<BearerToken> {
        self.token.read().await.clone()
    }

    async fn set(&self, token: BearerToken) {
        *self.token.write().await = Some(token);
    }

    async fn clear(&self) {
        *self.token.write().await = None;
    }
}

/// Owns the token lifecycle: cache lookup, serialized acquisition, and
/// invalidation after an authorization failure.
pub(crate) struct TokenManager {
    http: reqwest::Client,
    credentials: ChatCredentials,
    token_url: Url,
    store: Arc<dyn TokenStore>,
    acquire_lock: Mutex<()>,
}

impl TokenManager {
    pub(crate) fn new(
        http: reqwest::Client,
        credentials: ChatCredentials,
        token_url: Url,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self { http, credentials, token_url, store, acquire_lock: Mutex::new(()) }
    }

    /// Returns the cached token, fetching a fresh one on a miss.
    ///
    /// The fast path reads the store without taking the acquisition lock;
    /// the slow path re-checks the store under the lock before fetching.
    pub(crate) async fn ensure_token(&self) -> Result<BearerToken, Error> {
        if let Some(token) = self.store.get().await {
            return Ok(token);
        }

        let _guard = self.acquire_lock.lock().await;
        if let Some(token) = self.store.get().await {
            return Ok(token);
        }

        debug!(url = %self.token_url, "requesting chat access token");
        let token = self.fetch_token().await?;
        self.store.set(token.clone()).await;
        Ok(token)
    }

    /// Drops the cached token so the next request re-authenticates.
    ///
    /// Deliberately does not take the acquisition lock: a concurrent
    /// `ensure_token` may re-populate the store with a token that is about
    /// to be invalidated, which the retry in the chat request path absorbs.
    pub(crate) async fn invalidate(&self) {
        self.store.clear().await;
    }

    async fn fetch_token(&self) -> Result<BearerToken, Error> {
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(Error::from_transport)?;
        let body = read_classified(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
