//! Key schema: deterministic mapping from job identifier to store keys.
//!
//! One status hash per job, one notification channel per job, and a single
//! global channel carrying updates for every job. All derivations are pure;
//! collision-freedom follows from identifier uniqueness, which the job
//! framework guarantees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace prefix for status hash keys.
pub const STATUS_PREFIX: &str = "jobwatch:status:";

/// Channel receiving an event for every tracked job update.
pub const GLOBAL_CHANNEL: &str = "status_updates";

/// Prefix for per-job notification channels.
pub const JOB_CHANNEL_PREFIX: &str = "job_messages_";

/// Unique identifier of one job execution.
///
/// Assigned by the job framework at enqueue time; [`JobId::random`] covers
/// frameworks that delegate identifier generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an identifier supplied by the job framework.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Key of the status hash for a job.
#[must_use]
pub fn status_key(id: &JobId) -> String {
    format!("{STATUS_PREFIX}{id}")
}

/// Per-job notification channel name.
#[must_use]
pub fn job_channel(id: &JobId) -> String {
    format!("{JOB_CHANNEL_PREFIX}{id}")
}
