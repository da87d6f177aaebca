//! Request pre-processors.
//!
//! Pre-processors run in registration order on the fully built request,
//! right before dispatch. The first error aborts the call without making a
//! network request.

use tracing::debug;

use crate::error::Error;

/// Hook invoked on every outgoing request before dispatch.
pub trait RequestPreProcessor: Send + Sync {
    /// Inspect or mutate the request. Returning an error aborts the call.
    fn process(&self, request: &mut reqwest::Request) -> Result<(), Error>;
}

/// Pre-processor that logs every outgoing request at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPreProcessor;

impl RequestPreProcessor for LoggingPreProcessor {
    fn process(&self, request: &mut reqwest::Request) -> Result<(), Error> {
        debug!(method = %request.method(), url = %request.url(), "outbound request");
        Ok(())
    }
}
