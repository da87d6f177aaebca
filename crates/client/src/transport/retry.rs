//! Read retry policy.
//!
//! Idempotent reads get up to three attempts. Transient network failures are
//! retried unconditionally; a 429 re-arms the inter-attempt sleep from the
//! `Retry-After` response header; anything else is fatal immediately.
//! Exhaustion returns the last error unmodified so callers can distinguish
//! "retries exhausted while rate-limited" from "retries exhausted on a
//! network error".

use std::time::Duration;

use reqwest::RequestBuilder;
use tracing::{debug, warn};

use super::client::Client;
use crate::error::Error;

/// Request header carrying the 1-based attempt number, so downstream
/// observers can detect retried requests.
pub const ATTEMPT_COUNT_HEADER: &str = "X-Attempt-Count";

const MAX_READ_ATTEMPTS: u32 = 3;

impl Client {
    /// Send a read request with the retry policy applied.
    ///
    /// The builder is cloned per attempt; bodies that cannot be buffered
    /// fail with [`Error::UnclonableRequest`] before the first dispatch.
    pub(crate) async fn send_with_retry(&self, builder: RequestBuilder) -> Result<Vec<u8>, Error> {
        let mut retry_after_secs: u64 = 0;
        let mut last_error: Option<Error> = None;

        for attempt in 1..=MAX_READ_ATTEMPTS {
            let request = builder
                .try_clone()
                .ok_or(Error::UnclonableRequest)?
                .header(ATTEMPT_COUNT_HEADER, attempt.to_string())
                .build()
                .map_err(|source| Error::Network { transient: false, source })?;

            if retry_after_secs > 0 {
                debug!(attempt, retry_after_secs, "sleeping before retry");
            }
            tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;

            match self.dispatch(request).await {
                Ok(body) => return Ok(body),
                Err(error) => match &error {
                    Error::Network { transient: true, .. } => {
                        warn!(attempt, %error, "transient network failure, retrying");
                        last_error = Some(error);
                    }
                    Error::Api(api) if api.is_rate_limited() => {
                        if let Some(raw) = api.retry_after.as_deref() {
                            retry_after_secs = raw.trim().parse().map_err(|source| {
                                Error::RetryAfter { value: raw.to_owned(), source }
                            })?;
                        }
                        warn!(attempt, retry_after_secs, "rate limited, retrying");
                        last_error = Some(error);
                    }
                    _ => return Err(error),
                },
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Config("retry loop exited without an error".into())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::Credentials;

    fn test_client(server: &MockServer) -> Client {
        Client::builder("testcorp", Credentials::email_token("agent@testcorp.com", "token"))
            .support_base_url(server.uri())
            .timeout(Duration::from_millis(200))
            .build()
            .expect("client")
    }

    /// Responds slowly (forcing a client timeout) for the first `failures`
    /// requests, then quickly with 200.
    fn flaky_responder(
        failures: usize,
        counter: Arc<AtomicUsize>,
    ) -> impl Fn(&wiremock::Request) -> ResponseTemplate + Send + Sync {
        move |_req: &wiremock::Request| {
            let current = counter.fetch_add(1, Ordering::SeqCst);
            if current < failures {
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({}))
            } else {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true}))
            }
        }
    }

    #[tokio::test]
    async fn two_transient_failures_then_success_marks_the_third_attempt() {
        let server = MockServer::start().await;
        let counter = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .respond_with(flaky_responder(2, counter))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let body: serde_json::Value = client.get("/api/v2/anything.json").await.expect("response");
        assert_eq!(body["ok"], true);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests.last().unwrap().headers.get(ATTEMPT_COUNT_HEADER).unwrap(), "3");
    }

    #[tokio::test]
    async fn three_transient_failures_exhaust_into_a_network_error() {
        let server = MockServer::start().await;
        let counter = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .respond_with(flaky_responder(usize::MAX, counter))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result: Result<serde_json::Value, _> = client.get("/api/v2/anything.json").await;
        match result {
            Err(Error::Network { transient, .. }) => assert!(transient),
            other => panic!("expected network error, got {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rate_limited_response_is_retried_after_the_hint() {
        let server = MockServer::start().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        Mock::given(method("GET"))
            .respond_with(move |_req: &wiremock::Request| {
                if counter_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(429).insert_header("Retry-After", "0")
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true}))
                }
            })
            .mount(&server)
            .await;

        let client = test_client(&server);
        let body: serde_json::Value = client.get("/api/v2/anything.json").await.expect("response");
        assert_eq!(body["ok"], true);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_rate_limits_return_the_last_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result: Result<serde_json::Value, _> = client.get("/api/v2/anything.json").await;
        assert_eq!(result.unwrap_err().api_status(), Some(429));
    }

    #[tokio::test]
    async fn non_rate_limit_api_errors_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result: Result<serde_json::Value, _> = client.get("/api/v2/anything.json").await;
        assert_eq!(result.unwrap_err().api_status(), Some(500));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_retry_after_header_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "soon"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result: Result<serde_json::Value, _> = client.get("/api/v2/anything.json").await;
        assert!(matches!(result, Err(Error::RetryAfter { .. })));
    }

    #[tokio::test]
    async fn every_attempt_carries_its_attempt_number() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let _: Result<serde_json::Value, _> = client.get("/api/v2/anything.json").await;

        let requests = server.received_requests().await.unwrap();
        let attempts: Vec<_> = requests
            .iter()
            .map(|request| {
                request.headers.get(ATTEMPT_COUNT_HEADER).unwrap().to_str().unwrap().to_owned()
            })
            .collect();
        assert_eq!(attempts, ["1", "2", "3"]);
    }
}
