//! The terminal result record for one request.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use url::Url;

use crate::error::{DecodeError, TransportError};

/// Transport-level response snapshot: status, headers, final URL, and the
/// fully-read body.
///
/// Custom [`Transport`](crate::transport::Transport) implementations build
/// these with [`RawResponse::new`]; the shipped HTTP transport drains a
/// `reqwest::Response` via [`RawResponse::read`].
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    body: Bytes,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, url: Url, body: Bytes) -> Self {
        Self {
            status,
            headers,
            url,
            body,
        }
    }

    /// Drain a `reqwest::Response` into a snapshot.
    pub async fn read(response: reqwest::Response) -> Result<Self, TransportError> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            url,
            body,
        })
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The body, but only for non-2xx responses that actually carried one.
    #[must_use]
    pub fn error_body(&self) -> Option<&Bytes> {
        if self.is_success() || self.body.is_empty() {
            None
        } else {
            Some(&self.body)
        }
    }
}

/// Terminal outcome of one request, produced at most once.
///
/// Exactly one classification holds: decoded value, decode error, transport
/// error, or timeout/cancellation with none of those. A non-2xx completion
/// is the raw-only case - inspect [`RawResponse::error_body`]. The raw
/// response may co-exist with a decode error (the call returned, the body
/// did not decode) and with a timeout (the call returned after the watchdog
/// had already won).
#[derive(Debug)]
pub struct Outcome<T> {
    raw: Option<RawResponse>,
    value: Option<T>,
    decode_error: Option<DecodeError>,
    transport_error: Option<TransportError>,
    cancelled: bool,
    timed_out: bool,
}

impl<T> Outcome<T> {
    fn empty() -> Self {
        Self {
            raw: None,
            value: None,
            decode_error: None,
            transport_error: None,
            cancelled: false,
            timed_out: false,
        }
    }

    /// 2xx completion; `value` is absent when the body was empty and the
    /// decoder therefore never ran.
    pub(crate) fn success(raw: RawResponse, value: Option<T>) -> Self {
        Self {
            raw: Some(raw),
            value,
            ..Self::empty()
        }
    }

    /// Non-2xx completion: only the raw response is populated.
    pub(crate) fn http_error(raw: RawResponse) -> Self {
        Self {
            raw: Some(raw),
            ..Self::empty()
        }
    }

    pub(crate) fn decode_failed(raw: RawResponse, error: DecodeError) -> Self {
        Self {
            raw: Some(raw),
            decode_error: Some(error),
            ..Self::empty()
        }
    }

    pub(crate) fn transport_failed(error: TransportError) -> Self {
        Self {
            transport_error: Some(error),
            ..Self::empty()
        }
    }

    /// The watchdog won; a raw response that nevertheless arrived from the
    /// losing completion path is retained for inspection.
    pub(crate) fn timed_out(raw: Option<RawResponse>) -> Self {
        Self {
            raw,
            cancelled: true,
            timed_out: true,
            ..Self::empty()
        }
    }

    #[must_use]
    pub fn raw(&self) -> Option<&RawResponse> {
        self.raw.as_ref()
    }

    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn decode_error(&self) -> Option<&DecodeError> {
        self.decode_error.as_ref()
    }

    #[must_use]
    pub fn transport_error(&self) -> Option<&TransportError> {
        self.transport_error.as_ref()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// 2xx completion with no decode failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.raw.as_ref().is_some_and(RawResponse::is_success)
            && self.decode_error.is_none()
            && !self.timed_out
    }

    /// Consume the outcome, keeping only the decoded value.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}
