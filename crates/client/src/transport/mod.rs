//! Request transport: the client, its builder, request pre-processors, and
//! the read retry policy.

pub(crate) mod client;
mod preprocess;
mod retry;

pub use client::{Client, ClientBuilder, Endpoint};
pub use preprocess::{LoggingPreProcessor, RequestPreProcessor};
pub use retry::ATTEMPT_COUNT_HEADER;
