//! Deadline enforcement.
//!
//! One watchdog per deadline-bound request, nothing for unbounded ones.
//! Both variants sleep exactly once for the full remaining deadline and are
//! woken early when the request resolves first, so a finished request never
//! leaves a timer or thread lingering.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use tokio::sync::watch;

use crate::gate::CompletionGate;

/// Thread body for the blocking executor's watchdog.
///
/// Parks on the release channel for the full deadline; the completion path
/// drops the sender, which wakes this thread immediately. Only a genuine
/// timeout attempts the gate, and only a won gate invokes `cancel`.
pub(crate) fn stand_guard(
    limit: Duration,
    release: &Receiver<()>,
    gate: &CompletionGate,
    cancel: impl FnOnce(),
) {
    match release.recv_timeout(limit) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        Err(RecvTimeoutError::Timeout) => {
            if gate.try_cancel() {
                tracing::debug!(
                    deadline_ms = limit.as_millis() as u64,
                    "request deadline elapsed, cancelling transport"
                );
                cancel();
            }
        }
    }
}

/// Task body for the non-blocking executor's watchdog.
///
/// A single sleep raced against the request's resolution signal. `on_win`
/// runs only when the deadline elapsed first *and* this watchdog won the
/// gate; it owns the timeout side effects (transport cancel, task abort,
/// error delivery).
pub(crate) async fn stand_guard_async(
    limit: Duration,
    mut resolved: watch::Receiver<bool>,
    gate: &CompletionGate,
    on_win: impl FnOnce(),
) {
    tokio::select! {
        () = tokio::time::sleep(limit) => {
            if gate.try_cancel() {
                tracing::debug!(
                    deadline_ms = limit.as_millis() as u64,
                    "request deadline elapsed, cancelling transport"
                );
                on_win();
            }
        }
        _ = resolved.wait_for(|done| *done) => {}
    }
}
