//! Deadline-bounded HTTP request execution.
//!
//! This crate runs a single network operation - synchronously or
//! asynchronously - optionally bounded by a wall-clock deadline enforced by
//! an independent watchdog, and guarantees that exactly one outcome
//! (success, transport error, decode error, or timeout) is ever delivered,
//! regardless of which of "natural completion" or "watchdog expiry" happens
//! first.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`gate`] | Single-winner arbitration between completion and cancellation |
//! | [`executor`] | Blocking and non-blocking executors built on the gate |
//! | [`transport`] | The transport seam (execute + cross-thread cancel) |
//! | [`http`] | The shipped `reqwest`-backed transport |
//! | [`decode`] | Response body decoders (JSON, text, passthrough) |
//! | [`outcome`] | The terminal result record and raw-response snapshot |
//! | [`callback`] | Callback surface for the non-blocking path |
//! | [`config`] | Per-request configuration and shared defaults |
//! | [`request`] | GET/POST/DELETE requester builders |
//!
//! # Usage
//!
//! ```ignore
//! use courier_client::{Configuration, get};
//!
//! let outcome = get("https://example.com/report.json")
//!     .configuration(Configuration::new().with_call_timeout_secs(10))
//!     .json::<Report>()
//!     .execute();
//!
//! if let Some(report) = outcome.value() {
//!     println!("{report:?}");
//! }
//! ```
//!
//! # Race semantics
//!
//! Per request, the watchdog, the natural-completion path, and (on the
//! non-blocking side) an external cancel all funnel through one
//! [`gate::CompletionGate`]; the first to transition it wins and the losers
//! produce no observable side effects. A timeout is always reported as an
//! error; an explicit cancel is always silent. Tests must treat either
//! winner as valid - only the *exclusiveness* of the winner is guaranteed,
//! never the timing.

pub mod callback;
pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod gate;
pub mod http;
pub mod outcome;
pub mod request;
pub mod transport;

mod watchdog;

pub use callback::RequestCallback;
pub use config::{Configuration, shared_client, worker_runtime};
pub use decode::{BytesDecoder, JsonDecoder, ResponseDecoder, TextDecoder};
pub use error::{DecodeError, RequestError, TransportError};
pub use executor::RequestHandle;
pub use http::HttpTransport;
pub use outcome::{Outcome, RawResponse};
pub use request::{Requester, delete, get, post};
pub use transport::{AsyncTransport, Transport};

pub use courier_types::{Deadline, TaskIdentity, TaskState};
