//! Error taxonomy for request execution.
//!
//! Three concerns, kept apart because callers react to them differently:
//!
//! - [`TransportError`] - the network call itself failed (or was aborted by
//!   the cancel primitive);
//! - [`DecodeError`] - the call succeeded but the body did not decode; the
//!   raw response is retained alongside;
//! - [`RequestError`] - the umbrella delivered through callback error paths,
//!   adding the watchdog-synthesized timeout variant.

use std::time::Duration;

use thiserror::Error;

/// Failure of the transport call itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport's cancel primitive fired while the call was in flight.
    ///
    /// Executors treat this as expected when the deadline watchdog has
    /// already won the race; it only reaches callers when a custom
    /// transport surfaces it outside that window.
    #[error("transport call aborted by cancellation")]
    Aborted,

    /// The request URL could not be parsed or addressed.
    #[error("invalid request url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A one-shot transport was driven a second time.
    #[error("transport has already executed its request")]
    AlreadyExecuted,

    /// The HTTP layer failed (connect, TLS, protocol, body read).
    #[error("http transport failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// True when the failure is the cancel primitive surfacing, as opposed
    /// to a genuine network problem.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Decoding of an otherwise-successful response body failed.
///
/// Never aborts or retries the transport call; the outcome keeps the raw
/// response next to this error so callers can inspect what arrived.
#[derive(Debug, Error)]
#[error("response decoding failed: {message}")]
pub struct DecodeError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl DecodeError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_source(format!("invalid JSON body: {error}"), error)
    }
}

impl From<std::string::FromUtf8Error> for DecodeError {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::with_source("body is not valid UTF-8", error)
    }
}

/// Terminal error delivered to non-blocking callers through the callback
/// error path.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The deadline watchdog won the race; always reported, never silent.
    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl RequestError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
