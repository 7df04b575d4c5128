//! Response body decoders.
//!
//! A decoder turns the raw body of a successful response into the caller's
//! type. Decoders never see non-2xx bodies and never see empty bodies (the
//! executor skips them and leaves the value absent).

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::DecodeError;

/// Decode a response body into `T`.
///
/// Closures of the right shape implement this directly:
///
/// ```ignore
/// let lines = |body: &Bytes| Ok(body.split(|b| *b == b'\n').count());
/// ```
pub trait ResponseDecoder<T>: Send + Sync {
    fn decode(&self, body: &Bytes) -> Result<T, DecodeError>;
}

impl<T, F> ResponseDecoder<T> for F
where
    F: Fn(&Bytes) -> Result<T, DecodeError> + Send + Sync,
{
    fn decode(&self, body: &Bytes) -> Result<T, DecodeError> {
        self(body)
    }
}

/// JSON body via serde.
pub struct JsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> ResponseDecoder<T> for JsonDecoder<T> {
    fn decode(&self, body: &Bytes) -> Result<T, DecodeError> {
        serde_json::from_slice(body).map_err(DecodeError::from)
    }
}

/// Strict UTF-8 text body.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl ResponseDecoder<String> for TextDecoder {
    fn decode(&self, body: &Bytes) -> Result<String, DecodeError> {
        String::from_utf8(body.to_vec()).map_err(DecodeError::from)
    }
}

/// Raw passthrough: the body is handed over unconverted.
///
/// This is the decoder a requester uses when the caller never picked one.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDecoder;

impl ResponseDecoder<Bytes> for BytesDecoder {
    fn decode(&self, body: &Bytes) -> Result<Bytes, DecodeError> {
        Ok(body.clone())
    }
}
