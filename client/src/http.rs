//! The shipped `reqwest`-backed transport.

use std::sync::{Mutex, OnceLock, PoisonError};

use tokio::runtime::Runtime;
use tokio::sync::watch;

use crate::error::TransportError;
use crate::outcome::RawResponse;
use crate::transport::{AsyncTransport, Transport};

/// One-shot HTTP transport over a prepared `reqwest::Request`.
///
/// Cancellation is a `watch` flag raced against the HTTP future, so
/// `cancel()` from any thread aborts the in-flight call (request or body
/// read) with [`TransportError::Aborted`]. Driving the transport a second
/// time yields [`TransportError::AlreadyExecuted`].
///
/// The blocking [`Transport`] impl drives the same future on a shared
/// background runtime; it must not be called from inside an async context
/// (use the [`AsyncTransport`] impl there).
pub struct HttpTransport {
    client: reqwest::Client,
    request: Mutex<Option<reqwest::Request>>,
    cancel: watch::Sender<bool>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: reqwest::Client, request: reqwest::Request) -> Self {
        Self {
            client,
            request: Mutex::new(Some(request)),
            cancel: watch::Sender::new(false),
        }
    }

    async fn drive(&self) -> Result<RawResponse, TransportError> {
        let request = self
            .request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadyExecuted)?;

        let mut cancelled = self.cancel.subscribe();
        if *cancelled.borrow() {
            return Err(TransportError::Aborted);
        }

        let response = tokio::select! {
            response = self.client.execute(request) => response?,
            _ = cancelled.wait_for(|flag| *flag) => return Err(TransportError::Aborted),
        };

        tokio::select! {
            raw = RawResponse::read(response) => raw,
            _ = cancelled.wait_for(|flag| *flag) => Err(TransportError::Aborted),
        }
    }

    fn signal_cancel(&self) {
        if !self.cancel.send_replace(true) {
            tracing::debug!("http transport cancel primitive fired");
        }
    }
}

impl Transport for HttpTransport {
    fn execute(&self) -> Result<RawResponse, TransportError> {
        shared_runtime().block_on(self.drive())
    }

    fn cancel(&self) {
        self.signal_cancel();
    }
}

#[async_trait::async_trait]
impl AsyncTransport for HttpTransport {
    async fn execute(&self) -> Result<RawResponse, TransportError> {
        self.drive().await
    }

    fn cancel(&self) {
        self.signal_cancel();
    }
}

/// Shared background runtime for blocking execution and as the fallback
/// worker pool when no ambient runtime or explicit handle is available.
pub(crate) fn shared_runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("courier-worker")
            .build()
            .expect("background runtime must build; cannot drive blocking requests without it")
    })
}

#[cfg(test)]
mod tests {
    use super::HttpTransport;
    use crate::error::TransportError;
    use crate::transport::Transport;

    fn transport_for(url: &str) -> HttpTransport {
        let client = reqwest::Client::new();
        let request = client.get(url).build().unwrap();
        HttpTransport::new(client, request)
    }

    #[test]
    fn cancel_before_execute_aborts_without_a_request() {
        // Nothing listens on this port; a real attempt would error
        // differently, so Aborted proves the request never left.
        let transport = transport_for("http://127.0.0.1:9/never");
        transport.cancel();
        let result = Transport::execute(&transport);
        assert!(matches!(result, Err(TransportError::Aborted)));
    }

    #[test]
    fn second_execute_is_rejected() {
        let transport = transport_for("http://127.0.0.1:9/never");
        let _ = Transport::execute(&transport);
        let result = Transport::execute(&transport);
        assert!(matches!(result, Err(TransportError::AlreadyExecuted)));
    }

    #[test]
    fn cancel_after_completion_is_a_noop() {
        let transport = transport_for("http://127.0.0.1:9/never");
        let _ = Transport::execute(&transport);
        transport.cancel();
        transport.cancel();
    }
}
