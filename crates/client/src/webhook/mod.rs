//! Inbound webhook verification and dispatch.
//!
//! [`WebhookDispatcher`] owns the signing secret and a map from event type
//! to handler. Every delivery is verified against the signature headers
//! before any byte of the body is parsed; unverifiable deliveries are
//! rejected without reaching a handler.

mod signature;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

pub use signature::{
    build_signature, verify_signature, SIGNATURE_HEADER, SIGNATURE_TIMESTAMP_HEADER,
};

/// The common envelope of a webhook delivery.
///
/// `event` and `detail` are kept as raw JSON; typed handlers registered via
/// [`WebhookDispatcher::on_event`] decode the payload shape they expect.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event type, e.g. `zen:event-type:ticket.created`.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Account the event originated from.
    #[serde(default)]
    pub account_id: Option<i64>,
    /// Delivery identifier.
    #[serde(default)]
    pub id: String,
    /// When the event occurred.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    /// Event subject, e.g. a ticket URN.
    #[serde(default)]
    pub subject: String,
    /// Envelope schema version.
    #[serde(default)]
    pub zendesk_event_version: String,
    /// Type-specific event payload.
    #[serde(default)]
    pub event: serde_json::Value,
    /// Type-specific subject detail.
    #[serde(default)]
    pub detail: serde_json::Value,
}

/// The HTTP-shaped result of processing one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookOutcome {
    /// Status to answer the delivery with.
    pub status: StatusCode,
    /// Response body text.
    pub message: String,
}

impl WebhookOutcome {
    fn ok() -> Self {
        Self { status: StatusCode::OK, message: String::new() }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

enum HandlerFailure {
    Decode(serde_json::Error),
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerFailure>> + Send>>;
type DynHandler = Box<dyn Fn(Vec<u8>) -> HandlerFuture + Send + Sync>;

/// Verifies and routes webhook deliveries to registered handlers.
pub struct WebhookDispatcher {
    secret: String,
    handlers: HashMap<String, DynHandler>,
    fallback: Option<DynHandler>,
}

impl WebhookDispatcher {
    /// Creates a dispatcher with no handlers registered.
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into(), handlers: HashMap::new(), fallback: None }
    }

    /// Registers a typed handler for one event type.
    ///
    /// The full delivery body is decoded into `P`, so `P` is usually a
    /// struct mirroring the envelope fields the handler cares about.
    /// Registering the same event type twice replaces the earlier handler.
    pub fn on_event<P, F, Fut, E>(mut self, event_type: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: DynHandler = Box::new(move |body: Vec<u8>| {
            let handler = handler.clone();
            Box::pin(async move {
                let payload: P =
                    serde_json::from_slice(&body).map_err(HandlerFailure::Decode)?;
                handler(payload)
                    .await
                    .map_err(|error| HandlerFailure::Handler(Box::new(error)))
            })
        });
        self.handlers.insert(event_type.into(), boxed);
        self
    }

    /// Registers a handler for event types with no dedicated handler.
    ///
    /// The fallback receives the raw body; without one, unrecognized event
    /// types are acknowledged and dropped.
    pub fn fallback<F, Fut, E>(mut self, handler: F) -> Self
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.fallback = Some(Box::new(move |body: Vec<u8>| {
            let handler = handler.clone();
            Box::pin(async move {
                handler(body).await.map_err(|error| HandlerFailure::Handler(Box::new(error)))
            })
        }));
        self
    }

    /// Verifies and processes one delivery.
    ///
    /// The signature is checked before the body is parsed; a delivery that
    /// fails verification never reaches the JSON decoder or a handler.
    pub async fn handle(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> WebhookOutcome {
        let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
            warn!("webhook delivery missing signature headers");
            return WebhookOutcome::bad_request("Missing webhook signature headers");
        };
        if !verify_signature(&self.secret, signature, timestamp, body) {
            warn!("webhook delivery failed signature verification");
            return WebhookOutcome::bad_request("Failed to verify webhook signature");
        }

        let envelope: WebhookEvent = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "webhook delivery is not a valid event envelope");
                return WebhookOutcome::bad_request("Invalid webhook payload");
            }
        };
        if envelope.event_type.is_empty() {
            return WebhookOutcome::bad_request("Webhook payload has no event type");
        }

        let handler = match self.handlers.get(&envelope.event_type) {
            Some(handler) => handler,
            None => match &self.fallback {
                Some(fallback) => fallback,
                None => {
                    debug!(event_type = %envelope.event_type, "no handler, acknowledging");
                    return WebhookOutcome::ok();
                }
            },
        };

        match handler(body.to_vec()).await {
            Ok(()) => WebhookOutcome::ok(),
            Err(HandlerFailure::Decode(error)) => {
                warn!(event_type = %envelope.event_type, %error, "webhook payload decode failed");
                WebhookOutcome::bad_request("Invalid webhook payload")
            }
            Err(HandlerFailure::Handler(error)) => {
                warn!(event_type = %envelope.event_type, %error, "webhook handler failed");
                WebhookOutcome {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Server failed to process Webhook Request correctly".to_owned(),
                }
            }
        }
    }

    /// Wraps the dispatcher in a single-route router accepting POSTs at `/`.
    pub fn into_router(self) -> Router {
        Router::new().route("/", post(receive)).with_state(Arc::new(self))
    }
}

async fn receive(
    State(dispatcher): State<Arc<WebhookDispatcher>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookOutcome {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    let timestamp = headers.get(SIGNATURE_TIMESTAMP_HEADER).and_then(|value| value.to_str().ok());
    dispatcher.handle(signature, timestamp, &body).await
}
