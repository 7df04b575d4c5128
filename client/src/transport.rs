//! The transport seam.
//!
//! Executors coordinate *around* the network call without owning its wire
//! protocol. These traits are that boundary: a transport executes one
//! already-addressed call and exposes a cancel primitive that the deadline
//! watchdog (or an external canceller) may invoke from any thread.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::outcome::RawResponse;

/// A blocking network call, driven to completion on the calling thread.
pub trait Transport: Send + Sync {
    /// Drive the call and return the transport-level result.
    ///
    /// A call whose cancel primitive fired mid-flight should return
    /// [`TransportError::Aborted`]; the executor swallows that when the
    /// watchdog already won the gate.
    fn execute(&self) -> Result<RawResponse, TransportError>;

    /// Request cancellation of an in-flight call.
    ///
    /// Must be safe to invoke from a different thread than the one driving
    /// the call, and a no-op after completion. Idempotent.
    fn cancel(&self);
}

/// The non-blocking counterpart of [`Transport`].
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    /// Drive the call on the task that awaits it.
    async fn execute(&self) -> Result<RawResponse, TransportError>;

    /// Same contract as [`Transport::cancel`].
    fn cancel(&self);
}
