//! Blocking executor: the transport call runs on the calling thread.

use std::sync::mpsc;
use std::thread;

use courier_types::{Deadline, TaskIdentity};

use super::Classified;
use crate::decode::ResponseDecoder;
use crate::gate::CompletionGate;
use crate::outcome::Outcome;
use crate::transport::Transport;
use crate::watchdog;

/// Execute one transport call on the current thread, bounded by `deadline`.
///
/// With a bounded deadline a watchdog thread is started first; it parks for
/// the full deadline and is woken the moment the call returns, so it never
/// outlives this function. The watchdog invokes the transport's cancel
/// primitive directly - this thread is blocked inside the call and cannot.
///
/// Whichever of {watchdog, natural completion} wins the gate decides the
/// outcome. A losing completion result (including the abort error the
/// cancelled transport typically surfaces) is swallowed; the outcome is
/// already timeout-classified.
pub fn execute<T>(
    transport: &dyn Transport,
    decoder: &dyn ResponseDecoder<T>,
    deadline: Deadline,
    identity: Option<&TaskIdentity>,
) -> Outcome<T> {
    if let Some(identity) = identity {
        tracing::debug!(tag = identity.tag(), url = identity.url(), "dispatching blocking request");
    }

    let gate = CompletionGate::new();
    let (result, won) = match deadline.bound() {
        Some(limit) => thread::scope(|scope| {
            let (release_tx, release_rx) = mpsc::channel::<()>();
            let gate_ref = &gate;
            scope.spawn(move || {
                watchdog::stand_guard(limit, &release_rx, gate_ref, || transport.cancel());
            });
            let result = transport.execute();
            // Claim the gate before releasing the watchdog so the guard
            // can't fire against a call that already returned.
            let won = gate.disarm();
            drop(release_tx);
            (result, won)
        }),
        None => {
            let result = transport.execute();
            (result, gate.disarm())
        }
    };

    if !won {
        tracing::debug!("request lost the gate to the watchdog, swallowing its result");
        return Outcome::timed_out(result.ok());
    }

    match result {
        Ok(raw) => match super::classify(raw, decoder) {
            Classified::Success { raw, value } => Outcome::success(raw, value),
            Classified::HttpError { raw } => Outcome::http_error(raw),
            Classified::DecodeFailed { raw, error } => Outcome::decode_failed(raw, error),
        },
        Err(error) => {
            tracing::debug!(%error, "transport call failed");
            Outcome::transport_failed(error)
        }
    }
}
