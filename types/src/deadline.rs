//! Wall-clock deadline for one request.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Caller-supplied maximum duration for a request.
///
/// `Deadline::none()` (or any non-positive second count) means the request
/// runs unbounded and no watchdog is ever created for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deadline(Option<Duration>);

impl Deadline {
    /// No bound; the operation may run however long it takes.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Bound the request to `limit`. A zero duration means unbounded.
    #[must_use]
    pub const fn after(limit: Duration) -> Self {
        if limit.is_zero() {
            Self(None)
        } else {
            Self(Some(limit))
        }
    }

    /// Bound the request to a whole number of seconds; `secs <= 0` means
    /// unbounded.
    #[must_use]
    pub fn from_secs(secs: i64) -> Self {
        if secs <= 0 {
            Self(None)
        } else {
            Self(Some(Duration::from_secs(secs as u64)))
        }
    }

    /// The bound, if there is one.
    #[must_use]
    pub const fn bound(self) -> Option<Duration> {
        self.0
    }

    #[must_use]
    pub const fn is_bounded(self) -> bool {
        self.0.is_some()
    }
}

impl From<Option<Duration>> for Deadline {
    fn from(value: Option<Duration>) -> Self {
        match value {
            Some(limit) => Self::after(limit),
            None => Self::none(),
        }
    }
}

impl From<Duration> for Deadline {
    fn from(value: Duration) -> Self {
        Self::after(value)
    }
}
