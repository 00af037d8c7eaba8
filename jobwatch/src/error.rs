//! Error types for status tracking.

/// Errors from status store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Encoding or decoding a stored payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by [`StatusTracker::around_execution`](crate::StatusTracker::around_execution).
///
/// Separates faults in the tracking infrastructure from failures raised by the
/// job body itself, so the caller's retry handling sees the original job error
/// untouched.
#[derive(Debug, thiserror::Error)]
pub enum ExecError<E> {
    /// A status write failed while the job itself has not failed, either
    /// before the body ran or when recording its success.
    #[error("Status store error: {0}")]
    Store(#[from] StoreError),

    /// The job body returned an error. Recorded as `failed`, then passed
    /// through unchanged.
    #[error("Job failed: {0}")]
    Job(E),
}

impl<E> ExecError<E> {
    /// Unwrap the job's own error, if that is what this is.
    #[must_use]
    pub fn into_job_error(self) -> Option<E> {
        match self {
            Self::Job(e) => Some(e),
            Self::Store(_) => None,
        }
    }
}
