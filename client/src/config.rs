//! Per-request configuration.

use std::sync::OnceLock;
use std::time::Duration;

use courier_types::Deadline;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::runtime::Handle;

use crate::http;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Shared default HTTP client, built once and reused by every requester
/// (and transfer worker) that doesn't bring its own.
pub fn shared_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("failed to build default HTTP client: {e}. Using minimal client.");
                reqwest::Client::builder()
                    .build()
                    .expect("minimal HTTP client must build")
            })
    })
}

/// The worker pool used when neither an explicit runtime handle nor an
/// ambient tokio runtime is available.
///
/// Exposed so collaborators layered on this crate (transfer workers) share
/// one fallback pool instead of growing their own.
#[must_use]
pub fn worker_runtime() -> Handle {
    http::shared_runtime().handle().clone()
}

/// Settings for one request: the call deadline, default headers, and
/// optional overrides for the HTTP client and the worker runtime.
///
/// ```ignore
/// let config = Configuration::new()
///     .with_call_timeout_secs(10)
///     .with_header(header::ACCEPT, HeaderValue::from_static("application/json"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    call_timeout: Deadline,
    headers: HeaderMap,
    client: Option<reqwest::Client>,
    runtime: Option<Handle>,
    danger_accept_invalid_certs: bool,
}

impl Configuration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the whole call (connect, transfer, decode-ready body) by a
    /// wall-clock deadline.
    #[must_use]
    pub fn with_call_timeout(mut self, deadline: impl Into<Deadline>) -> Self {
        self.call_timeout = deadline.into();
        self
    }

    /// Deadline in whole seconds; `secs <= 0` means unbounded.
    #[must_use]
    pub fn with_call_timeout_secs(mut self, secs: i64) -> Self {
        self.call_timeout = Deadline::from_secs(secs);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Use a caller-built `reqwest::Client` (custom pool, proxy, TLS)
    /// instead of the shared default.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Run non-blocking requests on this runtime instead of the ambient one.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Skip TLS certificate verification. Only honored when no custom
    /// client was supplied.
    #[must_use]
    pub fn with_danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub fn call_timeout(&self) -> Deadline {
        self.call_timeout
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The HTTP client this configuration selects: the explicit override,
    /// a certificate-bypassing client when requested, or the shared default.
    ///
    /// Used by the requesters and by transfer workers layered on this crate.
    #[must_use]
    pub fn resolve_client(&self) -> reqwest::Client {
        if let Some(client) = &self.client {
            return client.clone();
        }
        if self.danger_accept_invalid_certs {
            match reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
                .danger_accept_invalid_certs(true)
                .build()
            {
                Ok(client) => return client,
                Err(e) => {
                    tracing::warn!(
                        "failed to build certificate-bypassing client: {e}. Using shared default."
                    );
                }
            }
        }
        shared_client().clone()
    }

    /// Explicit handle, then the ambient runtime, then the shared fallback
    /// pool - so worker lifecycle stays caller-controllable with a safe
    /// default.
    #[must_use]
    pub fn resolve_runtime(&self) -> Handle {
        self.runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .unwrap_or_else(worker_runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::Configuration;
    use courier_types::Deadline;
    use reqwest::header::{ACCEPT, HeaderValue};
    use std::time::Duration;

    #[test]
    fn builder_collects_settings() {
        let config = Configuration::new()
            .with_call_timeout_secs(7)
            .with_header(ACCEPT, HeaderValue::from_static("application/json"));
        assert_eq!(
            config.call_timeout().bound(),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            config.headers().get(ACCEPT),
            Some(&HeaderValue::from_static("application/json"))
        );
    }

    #[test]
    fn non_positive_timeout_is_unbounded() {
        let config = Configuration::new().with_call_timeout_secs(0);
        assert_eq!(config.call_timeout(), Deadline::none());
    }

    #[test]
    fn explicit_runtime_wins() {
        let config = Configuration::new().with_runtime(super::worker_runtime());
        // Outside any ambient runtime this still resolves to the handle we set.
        let _ = config.resolve_runtime();
    }
}
