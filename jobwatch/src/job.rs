//! Per-job-type tracking capabilities.

/// Capability a job type declares to participate in status tracking.
///
/// Both methods have defaults, so implementing the trait without overrides
/// leaves a job type untracked. Override [`tracked`](Self::tracked) to opt the
/// type in; override [`expiration`](Self::expiration) to give its records a
/// TTL that takes precedence over the globally configured one.
///
/// # Examples
///
/// ```rust
/// use jobwatch::Trackable;
///
/// struct ReportJob;
///
/// impl Trackable for ReportJob {
///     fn tracked(&self) -> bool {
///         true
///     }
///
///     fn expiration(&self) -> Option<u64> {
///         // Keep report statuses around for a full day.
///         Some(24 * 60 * 60)
///     }
/// }
/// ```
pub trait Trackable {
    /// Whether this job type opts in to status tracking.
    fn tracked(&self) -> bool {
        false
    }

    /// Record TTL in seconds for this job type, overriding the global
    /// configuration when present.
    fn expiration(&self) -> Option<u64> {
        None
    }
}
