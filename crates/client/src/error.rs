//! Error taxonomy for the client.
//!
//! Every fallible operation returns [`Error`], a closed enum that callers can
//! pattern-match exhaustively. The two variants that matter for retry
//! decisions are [`Error::Network`] (socket/DNS/TLS-layer failures, carrying
//! a `transient` flag) and [`Error::Api`] (anything the server answered
//! with, including malformed-body cases). Everything else is fatal.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never produced an HTTP response. `transient` is true for
    /// failures conventionally retryable at the socket layer (timeouts,
    /// refused or reset connections).
    #[error("network error: {source}")]
    Network {
        /// Whether the failure is worth retrying.
        transient: bool,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A successful response body failed to decode into the caller's target.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// An endpoint path or a server-supplied next link was not a valid URL.
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    /// A rate-limited response carried a `Retry-After` header that was not a
    /// decimal number of seconds.
    #[error("invalid Retry-After header value {value:?}")]
    RetryAfter {
        /// The raw header value.
        value: String,
        /// The parse failure.
        #[source]
        source: std::num::ParseIntError,
    },

    /// The request body cannot be replayed across retry attempts.
    #[error("request body cannot be cloned; buffer the body to enable retries")]
    UnclonableRequest,

    /// A request pre-processor aborted the call before dispatch.
    #[error("request pre-processor failed: {0}")]
    PreProcessor(String),

    /// The client configuration is invalid.
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// A chat or real-time-chat operation was attempted without chat
    /// credentials configured.
    #[error("chat credentials are not configured")]
    MissingChatCredentials,

    /// The token endpoint answered 200 with an empty access token.
    #[error("token endpoint returned an empty access token")]
    EmptyToken,

    /// An agent event reported a non-numeric engagement count.
    #[error("agent {agent_id} reported a non-numeric engagement count {value:?}")]
    EventValue {
        /// The agent the event belongs to.
        agent_id: u64,
        /// The raw event value.
        value: String,
        /// The parse failure.
        #[source]
        source: std::num::ParseIntError,
    },
}

impl Error {
    /// True for network failures the retry policy may replay.
    #[must_use]
    pub fn is_transient_network(&self) -> bool {
        matches!(self, Self::Network { transient: true, .. })
    }

    /// The HTTP status code, when the server answered at all.
    #[must_use]
    pub fn api_status(&self) -> Option<u16> {
        match self {
            Self::Api(api) => Some(api.status),
            _ => None,
        }
    }

    /// Classify a transport-level failure from `reqwest`.
    pub(crate) fn from_transport(source: reqwest::Error) -> Self {
        let transient = source.is_timeout() || source.is_connect() || source.is_request();
        Self::Network { transient, source }
    }
}

/// A non-2xx answer from the API, with the body classified into a primary
/// message and a secondary description.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code of the response.
    pub status: u16,
    /// Primary error message. Empty when the body carried none.
    pub message: String,
    /// Secondary detail: the error description, or for non-JSON bodies a note
    /// recording the actual content type.
    pub description: String,
    /// Raw `Retry-After` header value, consumed by the retry policy.
    pub(crate) retry_after: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "Zendesk API error, status code {}", self.status)
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for ApiError {}

/// First candidate body shape: `{"error": {"title": ..., "message": ...}}`.
#[derive(Debug, Default, Deserialize)]
struct TitledErrorBody {
    #[serde(default)]
    error: TitledError,
}

#[derive(Debug, Default, Deserialize)]
struct TitledError {
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
}

/// Second candidate body shape:
/// `{"error": "...", "description": "...", "details": {field: [{error, description}]}}`.
#[derive(Debug, Deserialize)]
struct FlatErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    details: BTreeMap<String, Vec<ErrorDetail>>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    error: String,
    #[serde(default)]
    description: String,
}

impl ApiError {
    /// Build an `ApiError` from a non-2xx response.
    ///
    /// Non-JSON bodies are recorded verbatim without a parse attempt. JSON
    /// bodies are tried against the two known error shapes in order; the
    /// first that yields a non-empty primary message wins.
    pub(crate) fn from_response(
        status: u16,
        content_type: Option<&str>,
        retry_after: Option<String>,
        body: &[u8],
    ) -> Self {
        let content_type = content_type.unwrap_or_default();
        if !content_type.contains("application/json") {
            return Self {
                status,
                message: String::from_utf8_lossy(body).into_owned(),
                description: format!(
                    "encountered error - response content is '{content_type}', not JSON"
                ),
                retry_after,
            };
        }

        if let Ok(titled) = serde_json::from_slice::<TitledErrorBody>(body) {
            if !titled.error.message.is_empty() {
                return Self {
                    status,
                    message: titled.error.title,
                    description: titled.error.message,
                    retry_after,
                };
            }
        }

        if let Ok(flat) = serde_json::from_slice::<FlatErrorBody>(body) {
            if !flat.error.is_empty() {
                let mut message = flat.error;
                if !flat.details.is_empty() {
                    let details: Vec<String> = flat
                        .details
                        .iter()
                        .flat_map(|(field, entries)| {
                            entries.iter().map(move |entry| {
                                format!("[{field}: {} - {}]", entry.error, entry.description)
                            })
                        })
                        .collect();
                    message = format!("{message}. Error details: {}", details.join(", "));
                }

                return Self { status, message, description: flat.description, retry_after };
            }
        }

        Self { status, message: String::new(), description: String::new(), retry_after }
    }

    /// Whether the server reported a condition that will not change on
    /// resubmission (`RecordInvalid` / `RecordNotFound`).
    #[must_use]
    pub fn is_immutable_record(&self) -> bool {
        self.message.starts_with("RecordInvalid") || self.message.starts_with("RecordNotFound")
    }

    /// Whether this error is a rate-limit rejection.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}
