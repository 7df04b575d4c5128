//! Requester surface: method, URL, headers, and body assembly in front of
//! the executors.

use std::sync::Arc;

use bytes::Bytes;
use courier_types::TaskIdentity;
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use url::Url;

use crate::callback::RequestCallback;
use crate::config::Configuration;
use crate::decode::{BytesDecoder, JsonDecoder, ResponseDecoder, TextDecoder};
use crate::error::{RequestError, TransportError};
use crate::executor::{self, RequestHandle};
use crate::http::HttpTransport;
use crate::outcome::Outcome;

/// GET requester; the raw body is passed through until a decoder is chosen.
#[must_use]
pub fn get(url: impl Into<String>) -> Requester<Bytes> {
    Requester::with_method(Method::GET, url)
}

/// POST requester.
#[must_use]
pub fn post(url: impl Into<String>) -> Requester<Bytes> {
    Requester::with_method(Method::POST, url)
}

/// DELETE requester.
#[must_use]
pub fn delete(url: impl Into<String>) -> Requester<Bytes> {
    Requester::with_method(Method::DELETE, url)
}

enum BodySpec {
    Text(String),
    Json(String),
    Form(Vec<(String, String)>),
    Raw {
        content_type: Option<HeaderValue>,
        payload: Bytes,
    },
}

/// Builder for one request.
///
/// Terminal operations hand the assembled transport to the executors:
/// [`execute`](Requester::execute) blocks the calling thread,
/// [`enqueue`](Requester::enqueue) returns a cancellable handle and
/// delivers through the callback surface. Both honor the configuration's
/// call deadline.
pub struct Requester<T> {
    method: Method,
    url: String,
    configuration: Configuration,
    body: Option<BodySpec>,
    query: Vec<(String, String)>,
    decoder: Arc<dyn ResponseDecoder<T>>,
    tag: Option<String>,
}

impl Requester<Bytes> {
    fn with_method(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            configuration: Configuration::default(),
            body: None,
            query: Vec::new(),
            decoder: Arc::new(BytesDecoder),
            tag: None,
        }
    }
}

impl<T> Requester<T> {
    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Correlation tag; a random one is generated when unset.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.configuration = self.configuration.with_header(name, value);
        self
    }

    /// Append query parameters to the URL.
    #[must_use]
    pub fn query(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(params);
        self
    }

    /// `text/plain` body.
    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.body = Some(BodySpec::Text(text.into()));
        self
    }

    /// Pre-serialized JSON body; also sets `Content-Type` and `Accept`.
    #[must_use]
    pub fn json_body(mut self, json: impl Into<String>) -> Self {
        self.body = Some(BodySpec::Json(json.into()));
        self
    }

    /// URL-encoded form body.
    #[must_use]
    pub fn form(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.body = Some(BodySpec::Form(params.into_iter().collect()));
        self
    }

    /// Arbitrary body with an optional content type.
    #[must_use]
    pub fn raw_body(mut self, content_type: Option<HeaderValue>, payload: Bytes) -> Self {
        self.body = Some(BodySpec::Raw {
            content_type,
            payload,
        });
        self
    }

    /// Decode the response body with `decoder`.
    #[must_use]
    pub fn decode_with<U>(self, decoder: impl ResponseDecoder<U> + 'static) -> Requester<U> {
        Requester {
            method: self.method,
            url: self.url,
            configuration: self.configuration,
            body: self.body,
            query: self.query,
            decoder: Arc::new(decoder),
            tag: self.tag,
        }
    }

    /// Decode the response body as JSON into `U`.
    #[must_use]
    pub fn json<U>(self) -> Requester<U>
    where
        U: DeserializeOwned + Send + 'static,
    {
        self.decode_with(JsonDecoder::new())
    }

    /// Decode the response body as UTF-8 text.
    #[must_use]
    pub fn text(self) -> Requester<String> {
        self.decode_with(TextDecoder)
    }

    fn identity(&self) -> TaskIdentity {
        match &self.tag {
            Some(tag) => TaskIdentity::tagged(tag.clone(), self.url.clone()),
            None => TaskIdentity::new(self.url.clone()),
        }
    }

    fn build_transport(&self) -> Result<HttpTransport, TransportError> {
        let mut url = Url::parse(&self.url).map_err(|e| TransportError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
            drop(pairs);
        }

        let client = self.configuration.resolve_client();
        let mut headers = self.configuration.headers().clone();
        if matches!(self.body, Some(BodySpec::Json(_))) {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json;charset=utf-8"),
            );
            headers
                .entry(ACCEPT)
                .or_insert(HeaderValue::from_static("application/json"));
        }

        let mut builder = client.request(self.method.clone(), url).headers(headers);
        builder = match &self.body {
            None => builder,
            Some(BodySpec::Text(text)) => builder
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain;charset=utf-8"),
                )
                .body(text.clone()),
            Some(BodySpec::Json(json)) => builder.body(json.clone()),
            Some(BodySpec::Form(params)) => builder.form(params),
            Some(BodySpec::Raw {
                content_type,
                payload,
            }) => {
                let builder = match content_type {
                    Some(value) => builder.header(CONTENT_TYPE, value.clone()),
                    None => builder,
                };
                builder.body(payload.clone())
            }
        };

        let request = builder.build()?;
        Ok(HttpTransport::new(client, request))
    }

    /// Run the request on the calling thread and return its outcome.
    ///
    /// Must not be called from inside an async context; use
    /// [`enqueue`](Requester::enqueue) there.
    pub fn execute(self) -> Outcome<T> {
        let identity = self.identity();
        match self.build_transport() {
            Ok(transport) => executor::execute(
                &transport,
                &*self.decoder,
                self.configuration.call_timeout(),
                Some(&identity),
            ),
            Err(error) => Outcome::transport_failed(error),
        }
    }

    /// Dispatch the request on the configured runtime and return a
    /// cancellable handle immediately.
    pub fn enqueue(self, callback: Arc<dyn RequestCallback<T>>) -> RequestHandle
    where
        T: Send + 'static,
    {
        let identity = self.identity();
        let deadline = self.configuration.call_timeout();
        match self.build_transport() {
            Ok(transport) => {
                let runtime = self.configuration.resolve_runtime();
                executor::enqueue(
                    Arc::new(transport),
                    self.decoder,
                    deadline,
                    callback,
                    &runtime,
                    Some(&identity),
                )
            }
            Err(error) => {
                callback.on_error(RequestError::Transport(error));
                RequestHandle::settled()
            }
        }
    }
}
