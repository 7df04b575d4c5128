//! Race and classification properties of the executors, driven by mock
//! transports with injectable delays.
//!
//! The winner of the watchdog/completion race is whichever transitions the
//! gate first; only its exclusiveness is guaranteed, so the race test below
//! accepts either ordering.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use courier_client::{
    AsyncTransport, DecodeError, RawResponse, RequestCallback, RequestError, ResponseDecoder,
    Transport, TransportError, executor,
};
use courier_types::Deadline;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use url::Url;

fn raw(status: u16, body: &[u8]) -> RawResponse {
    RawResponse::new(
        StatusCode::from_u16(status).unwrap(),
        HeaderMap::new(),
        Url::parse("https://example.com/resource").unwrap(),
        Bytes::copy_from_slice(body),
    )
}

fn len_decoder() -> impl ResponseDecoder<usize> {
    |body: &Bytes| Ok(body.len())
}

fn failing_decoder() -> impl ResponseDecoder<usize> {
    |_: &Bytes| Err(DecodeError::new("refused on principle"))
}

/// Blocking transport that takes `delay` to produce its response, honoring
/// the cancel primitive while it waits.
struct SlowTransport {
    delay: Duration,
    status: u16,
    body: &'static [u8],
    cancelled: AtomicBool,
    cancel_calls: AtomicUsize,
}

impl SlowTransport {
    fn new(delay: Duration, status: u16, body: &'static [u8]) -> Self {
        Self {
            delay,
            status,
            body,
            cancelled: AtomicBool::new(false),
            cancel_calls: AtomicUsize::new(0),
        }
    }

    fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

impl Transport for SlowTransport {
    fn execute(&self) -> Result<RawResponse, TransportError> {
        let start = Instant::now();
        while start.elapsed() < self.delay {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(TransportError::Aborted);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(raw(self.status, self.body))
    }

    fn cancel(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Blocking transport that fails outright.
struct BrokenTransport;

impl Transport for BrokenTransport {
    fn execute(&self) -> Result<RawResponse, TransportError> {
        Err(TransportError::InvalidUrl {
            url: "http://unroutable".into(),
            reason: "no route".into(),
        })
    }

    fn cancel(&self) {}
}

mod blocking {
    use super::*;

    #[test]
    fn unbounded_request_runs_without_a_watchdog() {
        let transport = SlowTransport::new(Duration::from_millis(40), 200, b"hello");
        let outcome = executor::execute(&transport, &len_decoder(), Deadline::none(), None);
        assert_eq!(outcome.value(), Some(&5));
        assert!(!outcome.is_timed_out());
        assert_eq!(transport.cancel_calls(), 0);
    }

    #[test]
    fn completion_before_deadline_is_untouched_by_the_watchdog() {
        let transport = SlowTransport::new(Duration::from_millis(20), 200, b"body");
        let outcome = executor::execute(
            &transport,
            &len_decoder(),
            Deadline::after(Duration::from_secs(2)),
            None,
        );
        assert_eq!(outcome.value(), Some(&4));
        assert!(!outcome.is_timed_out());
        assert!(!outcome.is_cancelled());
        assert_eq!(transport.cancel_calls(), 0);
    }

    #[test]
    fn deadline_beats_a_slow_transport() {
        let transport = SlowTransport::new(Duration::from_secs(5), 200, b"late");
        let start = Instant::now();
        let outcome = executor::execute(
            &transport,
            &len_decoder(),
            Deadline::after(Duration::from_millis(100)),
            None,
        );
        let elapsed = start.elapsed();

        assert!(outcome.is_timed_out());
        assert!(outcome.is_cancelled());
        assert!(outcome.value().is_none());
        assert!(outcome.transport_error().is_none(), "abort is swallowed");
        assert_eq!(transport.cancel_calls(), 1);
        assert!(
            elapsed < Duration::from_secs(2),
            "timed out in {elapsed:?}, nowhere near the transport's 5s"
        );
    }

    #[test]
    fn decode_failure_keeps_the_raw_response() {
        let transport = SlowTransport::new(Duration::ZERO, 200, b"payload");
        let outcome = executor::execute(&transport, &failing_decoder(), Deadline::none(), None);
        assert!(outcome.raw().is_some());
        assert!(outcome.decode_error().is_some());
        assert!(outcome.value().is_none());
        assert!(outcome.transport_error().is_none());
    }

    #[test]
    fn http_error_never_reaches_the_decoder() {
        let transport = SlowTransport::new(Duration::ZERO, 404, b"missing");
        let outcome = executor::execute(&transport, &failing_decoder(), Deadline::none(), None);
        let raw = outcome.raw().expect("raw response retained");
        assert_eq!(raw.status(), StatusCode::NOT_FOUND);
        assert_eq!(raw.error_body(), Some(&Bytes::from_static(b"missing")));
        assert!(outcome.decode_error().is_none());
        assert!(outcome.value().is_none());
    }

    #[test]
    fn empty_success_body_skips_the_decoder() {
        let transport = SlowTransport::new(Duration::ZERO, 200, b"");
        let outcome = executor::execute(&transport, &failing_decoder(), Deadline::none(), None);
        assert!(outcome.is_success());
        assert!(outcome.value().is_none());
        assert!(outcome.decode_error().is_none());
    }

    #[test]
    fn transport_failure_is_not_a_cancellation() {
        let outcome = executor::execute(
            &BrokenTransport,
            &len_decoder(),
            Deadline::after(Duration::from_secs(2)),
            None,
        );
        assert!(outcome.transport_error().is_some());
        assert!(!outcome.is_cancelled());
        assert!(!outcome.is_timed_out());
        assert!(outcome.raw().is_none());
    }
}

/// Async transport with an injectable delay, honoring cancel mid-flight.
struct AsyncMock {
    delay: Duration,
    status: u16,
    body: &'static [u8],
    cancel: tokio::sync::watch::Sender<bool>,
    cancel_calls: AtomicUsize,
}

impl AsyncMock {
    fn new(delay: Duration, status: u16, body: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            delay,
            status,
            body,
            cancel: tokio::sync::watch::Sender::new(false),
            cancel_calls: AtomicUsize::new(0),
        })
    }

    fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsyncTransport for AsyncMock {
    async fn execute(&self) -> Result<RawResponse, TransportError> {
        let mut cancelled = self.cancel.subscribe();
        tokio::select! {
            () = tokio::time::sleep(self.delay) => Ok(raw(self.status, self.body)),
            _ = cancelled.wait_for(|flag| *flag) => Err(TransportError::Aborted),
        }
    }

    fn cancel(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.cancel.send(true);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Success { status: u16, value: Option<usize> },
    Response { status: u16, has_value: bool, has_error_body: bool },
    Error { timeout: bool },
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl RequestCallback<usize> for Recorder {
    fn on_success(&self, response: &RawResponse, value: Option<&usize>) {
        self.events.lock().unwrap().push(Event::Success {
            status: response.status().as_u16(),
            value: value.copied(),
        });
    }

    fn on_error(&self, error: RequestError) {
        self.events.lock().unwrap().push(Event::Error {
            timeout: error.is_timeout(),
        });
    }

    fn on_response(&self, response: &RawResponse, value: Option<&usize>, error_body: Option<&Bytes>) {
        self.events.lock().unwrap().push(Event::Response {
            status: response.status().as_u16(),
            has_value: value.is_some(),
            has_error_body: error_body.is_some(),
        });
    }
}

async fn wait_for_events(recorder: &Recorder, count: usize) {
    for _ in 0..500 {
        if recorder.events().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "recorder never reached {count} events, saw {:?}",
        recorder.events()
    );
}

fn arc_len_decoder() -> Arc<dyn ResponseDecoder<usize>> {
    Arc::new(|body: &Bytes| Ok(body.len()))
}

mod nonblocking {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn delivers_success_then_response() {
        let transport = AsyncMock::new(Duration::from_millis(10), 200, b"hello");
        let recorder = Arc::new(Recorder::default());
        let handle = executor::enqueue(
            transport.clone(),
            arc_len_decoder(),
            Deadline::after(Duration::from_secs(2)),
            recorder.clone(),
            &tokio::runtime::Handle::current(),
            None,
        );

        wait_for_events(&recorder, 2).await;
        assert_eq!(
            recorder.events(),
            vec![
                Event::Success {
                    status: 200,
                    value: Some(5)
                },
                Event::Response {
                    status: 200,
                    has_value: true,
                    has_error_body: false
                },
            ]
        );
        assert_eq!(transport.cancel_calls(), 0);

        // Terminal delivery makes cancel a reported no-op.
        assert!(!handle.cancel());
        assert!(handle.is_settled());

        // The pending watchdog must produce no late duplicate.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(recorder.events().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn http_error_fires_response_only() {
        let transport = AsyncMock::new(Duration::from_millis(10), 404, b"gone");
        let recorder = Arc::new(Recorder::default());
        let _handle = executor::enqueue(
            transport.clone(),
            arc_len_decoder(),
            Deadline::after(Duration::from_secs(5)),
            recorder.clone(),
            &tokio::runtime::Handle::current(),
            None,
        );

        wait_for_events(&recorder, 1).await;
        assert_eq!(
            recorder.events(),
            vec![Event::Response {
                status: 404,
                has_value: false,
                has_error_body: true
            }]
        );

        // The watchdog was still pending at completion; it must never turn
        // this into a timeout afterwards.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(transport.cancel_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deadline_expiry_reports_a_timeout() {
        let transport = AsyncMock::new(Duration::from_secs(5), 200, b"late");
        let recorder = Arc::new(Recorder::default());
        let start = Instant::now();
        let handle = executor::enqueue(
            transport.clone(),
            arc_len_decoder(),
            Deadline::after(Duration::from_millis(100)),
            recorder.clone(),
            &tokio::runtime::Handle::current(),
            None,
        );

        wait_for_events(&recorder, 1).await;
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(recorder.events(), vec![Event::Error { timeout: true }]);
        assert_eq!(transport.cancel_calls(), 1);
        assert!(!handle.cancel());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(recorder.events().len(), 1, "timeout delivered exactly once");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn explicit_cancel_is_silent() {
        let transport = AsyncMock::new(Duration::from_secs(5), 200, b"never");
        let recorder = Arc::new(Recorder::default());
        let handle = executor::enqueue(
            transport.clone(),
            arc_len_decoder(),
            Deadline::none(),
            recorder.clone(),
            &tokio::runtime::Handle::current(),
            None,
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.cancel());
        assert!(!handle.cancel(), "second cancel lost the gate");
        assert_eq!(transport.cancel_calls(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(
            recorder.events().is_empty(),
            "explicit cancel must not deliver any callback, saw {:?}",
            recorder.events()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn watchdog_and_user_cancel_elect_one_winner() {
        let transport = AsyncMock::new(Duration::from_secs(5), 200, b"never");
        let recorder = Arc::new(Recorder::default());
        let handle = executor::enqueue(
            transport.clone(),
            arc_len_decoder(),
            Deadline::after(Duration::from_millis(50)),
            recorder.clone(),
            &tokio::runtime::Handle::current(),
            None,
        );

        // Aim the explicit cancel at the same instant the watchdog fires.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let user_won = handle.cancel();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let events = recorder.events();
        if user_won {
            assert!(events.is_empty(), "silent cancel won but saw {events:?}");
        } else {
            assert_eq!(events, vec![Event::Error { timeout: true }]);
        }
        assert_eq!(
            transport.cancel_calls(),
            1,
            "the loser's cancel side effect must not fire"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_the_handle_does_not_cancel() {
        let transport = AsyncMock::new(Duration::from_millis(40), 200, b"kept");
        let recorder = Arc::new(Recorder::default());
        let handle = executor::enqueue(
            transport.clone(),
            arc_len_decoder(),
            Deadline::none(),
            recorder.clone(),
            &tokio::runtime::Handle::current(),
            None,
        );
        drop(handle);

        wait_for_events(&recorder, 2).await;
        assert_eq!(transport.cancel_calls(), 0);
        assert!(matches!(
            recorder.events()[0],
            Event::Success {
                status: 200,
                value: Some(4)
            }
        ));
    }
}
