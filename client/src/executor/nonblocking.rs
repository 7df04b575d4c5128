//! Non-blocking executor: the transport call runs as a task on a worker
//! runtime, the caller gets a cancellable handle immediately, and the
//! outcome arrives through the callback surface.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use courier_types::{Deadline, TaskIdentity};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::callback::RequestCallback;
use crate::decode::ResponseDecoder;
use crate::error::RequestError;
use crate::gate::CompletionGate;
use crate::transport::AsyncTransport;
use crate::watchdog;

/// State shared by the request task, the watchdog, and the caller's handle.
///
/// The gate elects the winner; the in-flight slot is the one mutex all
/// three actors clear through, so a loser can never abort or dispose after
/// delivery has happened.
struct Shared {
    gate: CompletionGate,
    transport: Arc<dyn AsyncTransport>,
    in_flight: Mutex<Option<AbortHandle>>,
    resolved: watch::Sender<bool>,
}

impl Shared {
    fn take_in_flight(&self) -> Option<AbortHandle> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Natural completion won: release resources, cancel nothing.
    fn release(&self) {
        drop(self.take_in_flight());
        let _ = self.resolved.send(true);
    }

    /// A cancellation path won: dispose the in-flight call.
    fn dispose(&self) {
        let in_flight = self.take_in_flight();
        self.transport.cancel();
        if let Some(abort) = in_flight {
            abort.abort();
        }
        let _ = self.resolved.send(true);
    }
}

/// Cancellable handle for an enqueued request.
///
/// Holds only a weak reference: dropping the handle neither cancels the
/// request nor keeps any of its resources alive.
pub struct RequestHandle {
    shared: Weak<Shared>,
}

impl RequestHandle {
    /// Handle for a request that already reached its terminal state.
    pub(crate) fn settled() -> Self {
        Self {
            shared: Weak::new(),
        }
    }

    /// Cancel the request if it has not reached a terminal state yet.
    ///
    /// Returns true iff this call won the gate and disposed the in-flight
    /// call. A winning cancel is silent: no callback fires at all, unlike a
    /// timeout. After terminal delivery this is a no-op returning false.
    pub fn cancel(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        if !shared.gate.try_cancel() {
            return false;
        }
        shared.dispose();
        tracing::debug!("request cancelled by caller before completion");
        true
    }

    /// Whether the request has reached its terminal state.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared
            .upgrade()
            .is_none_or(|shared| shared.gate.resolved())
    }
}

/// Dispatch one transport call on `runtime`, returning a cancellable handle
/// immediately.
///
/// With a bounded deadline a watchdog task races a single sleep against the
/// request's resolution; on winning the gate it disposes the call and
/// reports [`RequestError::Timeout`] through the error callback. Natural
/// completion delivers the sequence documented on
/// [`RequestCallback`]; an explicit [`RequestHandle::cancel`] delivers
/// nothing.
pub fn enqueue<T>(
    transport: Arc<dyn AsyncTransport>,
    decoder: Arc<dyn ResponseDecoder<T>>,
    deadline: Deadline,
    callback: Arc<dyn RequestCallback<T>>,
    runtime: &Handle,
    identity: Option<&TaskIdentity>,
) -> RequestHandle
where
    T: Send + 'static,
{
    if let Some(identity) = identity {
        tracing::debug!(tag = identity.tag(), url = identity.url(), "dispatching request");
    }

    let shared = Arc::new(Shared {
        gate: CompletionGate::new(),
        transport,
        in_flight: Mutex::new(None),
        resolved: watch::Sender::new(false),
    });

    let task = runtime.spawn({
        let shared = Arc::clone(&shared);
        let callback = Arc::clone(&callback);
        async move {
            let result = shared.transport.execute().await;
            if !shared.gate.disarm() {
                // A cancellation won; whatever surfaced here is swallowed.
                return;
            }
            shared.release();
            match result {
                Ok(raw) => super::deliver(raw, &*decoder, &*callback),
                Err(error) => callback.on_error(RequestError::Transport(error)),
            }
        }
    });

    {
        let mut slot = shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !shared.gate.resolved() {
            *slot = Some(task.abort_handle());
        }
    }

    if let Some(limit) = deadline.bound() {
        runtime.spawn({
            let shared = Arc::clone(&shared);
            let callback = Arc::clone(&callback);
            async move {
                let resolved = shared.resolved.subscribe();
                watchdog::stand_guard_async(limit, resolved, &shared.gate, || {
                    shared.dispose();
                    callback.on_error(RequestError::Timeout(limit));
                })
                .await;
            }
        });
    }

    RequestHandle {
        shared: Arc::downgrade(&shared),
    }
}
