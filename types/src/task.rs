//! Task identity and lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable identity of one request task: an opaque correlation tag plus
/// the target URL.
///
/// The tag is only used for correlation and logging; no uniqueness is
/// enforced anywhere. When callers don't care, a random v4 UUID is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskIdentity {
    tag: String,
    url: String,
}

impl TaskIdentity {
    /// Identity with a freshly generated UUID tag.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            tag: Uuid::new_v4().to_string(),
            url: url.into(),
        }
    }

    /// Identity with a caller-supplied tag.
    #[must_use]
    pub fn tagged(tag: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            url: url.into(),
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for TaskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.tag, self.url)
    }
}

/// Lifecycle state of a task.
///
/// The request executor only ever drives `Idle -> Started` and then exactly
/// one of the terminal states. `Ongoing` and `Paused` belong to workers
/// layered on top (chunked transfers report `Ongoing` while streaming and
/// `Paused` between range requests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Started,
    Ongoing,
    Completed,
    Cancelled,
    Error,
    Paused,
}

impl TaskState {
    /// Whether the state is terminal; a task in a terminal state never
    /// transitions again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Started => "started",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
