//! Job lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a tracked job.
///
/// Transitions move only forward: `Queued` → `Working` → one of the terminal
/// states. A terminal record never transitions again; it simply expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Record created at enqueue time, body not yet started.
    Queued,
    /// The job body is executing.
    Working,
    /// The job body returned normally.
    Complete,
    /// The job body raised an error.
    Failed,
    /// The worker process was told to terminate while the body was running.
    Interrupted,
}

impl Status {
    /// Wire representation stored in the status hash.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Working => "working",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        }
    }

    /// Whether this state admits no further transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Interrupted)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a wire status string.
#[derive(Debug, thiserror::Error)]
#[error("Unknown status: {0}")]
pub struct UnknownStatus(String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "working" => Ok(Self::Working),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "interrupted" => Ok(Self::Interrupted),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
