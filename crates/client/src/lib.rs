//! Async client for the Zendesk Support, Chat, and Real-Time Chat APIs.
//!
//! The crate is organized around a single [`Client`] that owns the HTTP
//! transport, authentication material, and the resilience behavior every
//! endpoint shares:
//!
//! - idempotent reads are retried up to three times, honoring `Retry-After`
//!   hints on rate-limited responses and marking each attempt in the
//!   `X-Attempt-Count` request header;
//! - chat and real-time-chat calls mint and cache an OAuth
//!   client-credentials bearer token lazily, re-acquiring it once on a 401;
//! - listing endpoints drive one of three pagination protocols (cursor,
//!   offset, incremental export) through a shared page loop;
//! - [`AgentStateAggregator`] folds the incremental agent-event stream into
//!   a current-state snapshot with a persistent watermark;
//! - [`WebhookDispatcher`] verifies inbound webhook signatures and routes
//!   events to caller-registered typed handlers.
//!
//! Resource payloads are deliberately the caller's business: every listing
//! and request method is generic over a `serde`-deserializable target, so
//! the crate never needs to model the full resource catalog.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod chat;
pub mod error;
pub mod pagination;
pub mod transport;
pub mod webhook;

pub use auth::{ChatCredentials, Credentials};
pub use chat::agent_events::{
    AgentEvent, AgentEventValue, AgentId, AgentState, AgentStateAggregator,
};
pub use chat::token::{BearerToken, InMemoryTokenStore, TokenStore};
pub use error::{ApiError, Error};
pub use pagination::{
    ChatExportPage, Continuation, CursorPage, ExportPage, OffsetPage, PagedResponse, SortDirection,
};
pub use transport::{Client, ClientBuilder, Endpoint, LoggingPreProcessor, RequestPreProcessor};
pub use webhook::{WebhookDispatcher, WebhookEvent, WebhookOutcome};
