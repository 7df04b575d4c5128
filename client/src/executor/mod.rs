//! Bounded-lifetime request executors.
//!
//! Both executors share one contract: run a single transport call, bound it
//! with an optional deadline enforced by an independent watchdog, and
//! deliver exactly one terminal outcome no matter which of natural
//! completion or watchdog expiry happens first. The
//! [`CompletionGate`](crate::gate::CompletionGate) arbitrates that race;
//! everything here is plumbing around it.

mod blocking;
mod nonblocking;

pub use blocking::execute;
pub use nonblocking::{RequestHandle, enqueue};

use crate::callback::RequestCallback;
use crate::decode::ResponseDecoder;
use crate::error::RequestError;
use crate::outcome::RawResponse;

/// Shared classification of a completed (returned) transport call.
enum Classified<T> {
    /// 2xx; `value` is absent when the body was empty.
    Success {
        raw: RawResponse,
        value: Option<T>,
    },
    /// Non-2xx; the raw response is the whole story.
    HttpError { raw: RawResponse },
    /// 2xx but the decoder rejected the body.
    DecodeFailed {
        raw: RawResponse,
        error: crate::error::DecodeError,
    },
}

fn classify<T>(raw: RawResponse, decoder: &dyn ResponseDecoder<T>) -> Classified<T> {
    if !raw.is_success() {
        return Classified::HttpError { raw };
    }
    if raw.body().is_empty() {
        return Classified::Success { raw, value: None };
    }
    match decoder.decode(raw.body()) {
        Ok(value) => Classified::Success {
            raw,
            value: Some(value),
        },
        Err(error) => {
            tracing::debug!(status = %raw.status(), %error, "response body failed to decode");
            Classified::DecodeFailed { raw, error }
        }
    }
}

/// Run the callback sequence for a natural completion that won the gate.
fn deliver<T>(
    raw: RawResponse,
    decoder: &dyn ResponseDecoder<T>,
    callback: &dyn RequestCallback<T>,
) {
    match classify(raw, decoder) {
        Classified::Success { raw, value } => {
            callback.on_success(&raw, value.as_ref());
            callback.on_response(&raw, value.as_ref(), None);
        }
        Classified::HttpError { raw } => {
            callback.on_response(&raw, None, raw.error_body());
        }
        Classified::DecodeFailed { raw: _, error } => {
            callback.on_error(RequestError::Decode(error));
        }
    }
}
