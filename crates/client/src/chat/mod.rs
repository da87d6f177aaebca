//! Chat and Real-Time Chat API access.
//!
//! Chat requests authenticate with an OAuth bearer token managed by
//! [`token::TokenStore`] rather than the Support credentials. A request
//! that comes back 401 invalidates the cached token and is tried once more
//! with a freshly acquired one.

pub mod agent_events;
pub mod token;

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Error;
use crate::transport::{Client, Endpoint};

const MAX_CHAT_ATTEMPTS: u32 = 2;

impl Client {
    /// Performs a GET against the Chat API and decodes the response.
    ///
    /// Requires chat credentials on the builder; fails with
    /// [`Error::MissingChatCredentials`] otherwise.
    pub async fn chat_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let body = self.chat_execute(Endpoint::Chat, path).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Performs a GET against the Real-Time Chat API and decodes the
    /// response. Shares the Chat token.
    pub async fn realtime_chat_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let body = self.chat_execute(Endpoint::RealTimeChat, path).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub(crate) async fn chat_execute(
        &self,
        endpoint: Endpoint,
        path: &str,
    ) -> Result<Vec<u8>, Error> {
        let manager = self.chat.as_ref().ok_or(Error::MissingChatCredentials)?;
        let url = self.endpoint_url(endpoint, path)?;

        let mut last_error: Option<Error> = None;
        for attempt in 1..=MAX_CHAT_ATTEMPTS {
            let token = manager.ensure_token().await?;
            if token.access_token.is_empty() {
                return Err(Error::EmptyToken);
            }

            let request = self
                .http
                .request(Method::GET, url.clone())
                .bearer_auth(&token.access_token)
                .build()
                .map_err(|source| Error::Network { transient: false, source })?;

            match self.dispatch(request).await {
                Ok(body) => return Ok(body),
                Err(error) if error.api_status() == Some(401) => {
                    debug!(attempt, %url, "chat token rejected, invalidating");
                    manager.invalidate().await;
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Config("chat request loop exited without an error".into())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::{ChatCredentials, Credentials};

    fn chat_client(server: &MockServer) -> Client {
        Client::builder("testcorp", Credentials::email_token("agent@testcorp.com", "token"))
            .chat_credentials(ChatCredentials::new("client-id", "client-secret"))
            .chat_base_url(server.uri())
            .realtime_chat_base_url(server.uri())
            .build()
            .expect("client")
    }

    fn token_mock(token: &str) -> Mock {
        let body = serde_json::json!({ "access_token": token, "token_type": "Bearer" });
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
    }

    #[tokio::test]
    async fn chat_requests_carry_the_bearer_token() {
        let server = MockServer::start().await;
        token_mock("chat-token").expect(1).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v2/chats"))
            .and(header("Authorization", "Bearer chat-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = chat_client(&server);
        let body: serde_json::Value = client.chat_get("/api/v2/chats").await.expect("response");
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn unauthorized_responses_invalidate_and_retry_once() {
        let server = MockServer::start().await;
        let token_counter = Arc::new(AtomicUsize::new(0));
        let token_counter_clone = token_counter.clone();
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(move |_req: &wiremock::Request| {
                let n = token_counter_clone.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": format!("tok-{n}"),
                }))
            })
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v2/chats"))
            .and(header("Authorization", "Bearer tok-0"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/chats"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = chat_client(&server);
        let body: serde_json::Value = client.chat_get("/api/v2/chats").await.expect("response");
        assert_eq!(body["ok"], true);
        assert_eq!(token_counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_unauthorized_gives_up_after_two_attempts() {
        let server = MockServer::start().await;
        token_mock("chat-token").expect(2).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v2/chats"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let client = chat_client(&server);
        let error = client.chat_get::<serde_json::Value>("/api/v2/chats").await.unwrap_err();
        assert_eq!(error.api_status(), Some(401));
    }

    #[tokio::test]
    async fn empty_access_tokens_fail_before_the_api_call() {
        let server = MockServer::start().await;
        token_mock("").mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v2/chats"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = chat_client(&server);
        let error = client.chat_get::<serde_json::Value>("/api/v2/chats").await.unwrap_err();
        assert!(matches!(error, Error::EmptyToken));
    }

    #[tokio::test]
    async fn chat_requires_chat_credentials() {
        let server = MockServer::start().await;
        let client =
            Client::builder("testcorp", Credentials::email_token("agent@testcorp.com", "token"))
                .chat_base_url(server.uri())
                .build()
                .expect("client");

        let error = client.chat_get::<serde_json::Value>("/api/v2/chats").await.unwrap_err();
        assert!(matches!(error, Error::MissingChatCredentials));
    }

    #[tokio::test]
    async fn non_auth_errors_are_not_retried() {
        let server = MockServer::start().await;
        token_mock("chat-token").expect(1).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v2/chats"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = chat_client(&server);
        let error = client.chat_get::<serde_json::Value>("/api/v2/chats").await.unwrap_err();
        assert_eq!(error.api_status(), Some(500));
    }
}
