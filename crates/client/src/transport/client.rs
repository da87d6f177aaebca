//! The client: configuration, host resolution, and the single-round-trip
//! request executor with response classification.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderValue};
use reqwest::{Method, Request, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::preprocess::RequestPreProcessor;
use crate::auth::{ChatCredentials, Credentials};
use crate::chat::token::{InMemoryTokenStore, TokenManager, TokenStore};
use crate::error::{ApiError, Error};

const DEFAULT_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_PATH: &str = "/oauth2/token";

/// The product endpoint a request resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The main API at `https://{subdomain}.zendesk.com`.
    Support,
    /// The chat API at `https://www.zopim.com`.
    Chat,
    /// The real-time chat API at `https://rtm.zopim.com`.
    RealTimeChat,
}

#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    support: Url,
    chat: Url,
    realtime_chat: Url,
}

impl Endpoints {
    fn resolve(&self, endpoint: Endpoint) -> &Url {
        match endpoint {
            Endpoint::Support => &self.support,
            Endpoint::Chat => &self.chat,
            Endpoint::RealTimeChat => &self.realtime_chat,
        }
    }
}

/// Client for the Zendesk Support, Chat, and Real-Time Chat APIs.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self` and the only
/// library-owned mutable state is the cached chat bearer token.
pub struct Client {
    pub(crate) http: reqwest::Client,
    pub(crate) endpoints: Endpoints,
    pub(crate) user_agent: HeaderValue,
    pub(crate) credentials: Credentials,
    pub(crate) chat: Option<TokenManager>,
    pub(crate) pre_processors: Vec<Arc<dyn RequestPreProcessor>>,
}

impl Client {
    /// Start building a client for the given account subdomain.
    pub fn builder(subdomain: impl Into<String>, credentials: Credentials) -> ClientBuilder {
        ClientBuilder::new(subdomain, credentials)
    }

    /// Resolve a path against the product endpoint. Absolute URLs
    /// (server-supplied next links) are used verbatim.
    pub(crate) fn endpoint_url(&self, endpoint: Endpoint, path_or_url: &str) -> Result<Url, Error> {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            Ok(Url::parse(path_or_url)?)
        } else {
            Ok(self.endpoints.resolve(endpoint).join(path_or_url)?)
        }
    }

    fn apply_default_headers(&self, request: &mut Request) {
        let headers = request.headers_mut();
        if !headers.contains_key(header::ACCEPT) {
            headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        }
        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(header::USER_AGENT, self.user_agent.clone());
        }
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
    }

    /// Perform exactly one network round trip and classify the result.
    pub(crate) async fn dispatch(&self, mut request: Request) -> Result<Vec<u8>, Error> {
        self.apply_default_headers(&mut request);

        for pre_processor in &self.pre_processors {
            pre_processor.process(&mut request)?;
        }

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "dispatching request");

        let response = self.http.execute(request).await.map_err(Error::from_transport)?;
        debug!(%method, %url, status = %response.status(), "received response");

        read_classified(response).await
    }

    /// Issue an authenticated, retried GET against the main API and decode
    /// the response into `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.endpoint_url(Endpoint::Support, path)?;
        let builder = self.credentials.apply(self.http.get(url));
        let body = self.send_with_retry(builder).await?;
        serde_json::from_slice(&body).map_err(Error::Decode)
    }

    /// Issue a single-shot authenticated request against the main API and
    /// decode the response into `T`. Writes are never retried.
    pub async fn send<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let bytes = self.send_raw(method, path, body).await?;
        serde_json::from_slice(&bytes).map_err(Error::Decode)
    }

    /// Like [`Client::send`] for endpoints that answer with no content (or
    /// content the caller does not care about).
    pub async fn send_no_content<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), Error>
    where
        B: Serialize + ?Sized,
    {
        self.send_raw(method, path, body).await.map(|_| ())
    }

    async fn send_raw<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Vec<u8>, Error>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint_url(Endpoint::Support, path)?;
        let mut builder = self.credentials.apply(self.http.request(method, url));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let request = builder.build().map_err(|source| Error::Network { transient: false, source })?;
        self.dispatch(request).await
    }
}

/// Read a response body, turning any status >= 400 into an [`ApiError`].
///
/// If the error body's `Content-Type` is not JSON, the raw bytes and the
/// content type are recorded verbatim with no parse attempt.
pub(crate) async fn read_classified(response: Response) -> Result<Vec<u8>, Error> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(Error::from_transport)?;
        return Err(Error::Api(ApiError::from_response(
            status.as_u16(),
            content_type.as_deref(),
            retry_after,
            &body,
        )));
    }

    Ok(response.bytes().await.map_err(Error::from_transport)?.to_vec())
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    subdomain: String,
    credentials: Credentials,
    chat_credentials: Option<ChatCredentials>,
    token_store: Option<Arc<dyn TokenStore>>,
    pre_processors: Vec<Arc<dyn RequestPreProcessor>>,
    user_agent: String,
    timeout: Duration,
    support_base: Option<String>,
    chat_base: Option<String>,
    realtime_chat_base: Option<String>,
}

impl ClientBuilder {
    fn new(subdomain: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            subdomain: subdomain.into(),
            credentials,
            chat_credentials: None,
            token_store: None,
            pre_processors: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            support_base: None,
            chat_base: None,
            realtime_chat_base: None,
        }
    }

    /// Enable the chat and real-time-chat APIs.
    #[must_use]
    pub fn chat_credentials(mut self, credentials: ChatCredentials) -> Self {
        self.chat_credentials = Some(credentials);
        self
    }

    /// Back the bearer-token cache with a custom store. Defaults to an
    /// in-process store.
    #[must_use]
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Register a pre-processor; runs in registration order on every request.
    #[must_use]
    pub fn pre_processor(mut self, pre_processor: Arc<dyn RequestPreProcessor>) -> Self {
        self.pre_processors.push(pre_processor);
        self
    }

    /// Override the default `User-Agent` header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Per-request timeout. Defaults to 30 seconds.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the main API base URL (primarily for tests).
    #[must_use]
    pub fn support_base_url(mut self, base: impl Into<String>) -> Self {
        self.support_base = Some(base.into());
        self
    }

    /// Override the chat API base URL; the token endpoint follows it.
    #[must_use]
    pub fn chat_base_url(mut self, base: impl Into<String>) -> Self {
        self.chat_base = Some(base.into());
        self
    }

    /// Override the real-time chat API base URL.
    #[must_use]
    pub fn realtime_chat_base_url(mut self, base: impl Into<String>) -> Self {
        self.realtime_chat_base = Some(base.into());
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the user agent is not a valid header
    /// value or the HTTP client cannot be constructed, and [`Error::Url`]
    /// when a base URL override does not parse.
    pub fn build(self) -> Result<Client, Error> {
        let support = match &self.support_base {
            Some(base) => Url::parse(base)?,
            None => Url::parse(&format!("https://{}.zendesk.com", self.subdomain))?,
        };
        let chat = match &self.chat_base {
            Some(base) => Url::parse(base)?,
            None => Url::parse("https://www.zopim.com")?,
        };
        let realtime_chat = match &self.realtime_chat_base {
            Some(base) => Url::parse(base)?,
            None => Url::parse("https://rtm.zopim.com")?,
        };

        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|err| Error::Config(format!("invalid user agent: {err}")))?;

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .no_proxy()
            .build()
            .map_err(|err| Error::Config(format!("failed to build HTTP client: {err}")))?;

        let chat_manager = match self.chat_credentials {
            Some(credentials) => {
                let token_url = chat.join(TOKEN_PATH)?;
                let store = self
                    .token_store
                    .unwrap_or_else(|| Arc::new(InMemoryTokenStore::default()));
                Some(TokenManager::new(http.clone(), credentials, token_url, store))
            }
            None => None,
        };

        Ok(Client {
            http,
            endpoints: Endpoints { support, chat, realtime_chat },
            user_agent,
            credentials: self.credentials,
            chat: chat_manager,
            pre_processors: self.pre_processors,
        })
    }
}
