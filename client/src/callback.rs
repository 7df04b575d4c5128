//! Callback surface for the non-blocking executor.

use bytes::Bytes;

use crate::error::RequestError;
use crate::outcome::RawResponse;

/// Receives the single terminal notification sequence of one request.
///
/// All methods default to no-ops; implement the ones you care about. For a
/// single request exactly one of these sequences fires:
///
/// - 2xx, body decoded (or empty): `on_success` then `on_response`;
/// - non-2xx: `on_response` only, with the error body;
/// - transport failure, decode failure, or deadline timeout: `on_error`;
/// - explicit cancellation through the handle: nothing at all.
///
/// The silent explicit cancel is deliberate - "you asked to stop" is not an
/// error, while "it took too long" always is.
pub trait RequestCallback<T>: Send + Sync {
    /// The request completed with a 2xx status. `value` is absent when the
    /// response body was empty.
    fn on_success(&self, response: &RawResponse, value: Option<&T>) {
        let _ = (response, value);
    }

    /// Transport failure, decode failure, or timeout.
    fn on_error(&self, error: RequestError) {
        let _ = error;
    }

    /// Any completion, success or HTTP error. Never fires on timeout or
    /// cancellation.
    fn on_response(&self, response: &RawResponse, value: Option<&T>, error_body: Option<&Bytes>) {
        let _ = (response, value, error_body);
    }
}
