//! Status tracking for background jobs over a shared key-value store.
//!
//! Records the lifecycle of asynchronously executed jobs (`queued`,
//! `working`, `complete`, `failed`, `interrupted`) in Redis hashes and
//! publishes real-time update notifications over pub/sub. The job framework
//! itself stays in charge of queueing, scheduling, and retries; this crate
//! wraps its enqueue and execution hooks with a [`StatusTracker`], answers
//! queries through a [`StatusClient`], and lets running jobs publish progress
//! through a [`Reporter`].
//!
//! Records are self-cleaning: every write applies a TTL, so finished and
//! abandoned statuses disappear without a deletion pass. Tracking is opt-in
//! per job type via [`Trackable`], or global via the `all_jobs` policy.
//!
//! # Example
//!
//! ```rust
//! use jobwatch::{JobId, MemoryStore, StatusClient, StatusTracker, Trackable, TrackerConfig};
//! use std::sync::Arc;
//!
//! struct ImportJob;
//!
//! impl Trackable for ImportJob {
//!     fn tracked(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let tracker = StatusTracker::new(store.clone(), TrackerConfig::default());
//! let id = JobId::random();
//!
//! tracker.on_enqueue(&ImportJob, &id, None).await?;
//! tracker
//!     .around_execution(&ImportJob, &id, || async {
//!         Ok::<_, std::io::Error>(())
//!     })
//!     .await?;
//!
//! let client = StatusClient::new(store);
//! assert!(client.is_complete(&id).await?);
//! # Ok(())
//! # }
//! ```
//!
//! Production deployments use [`RedisStore`] in place of [`MemoryStore`] and
//! install the process-termination hook with [`signal::install`] so jobs cut
//! short by SIGTERM or SIGINT are recorded as `interrupted`:
//!
//! ```rust,no_run
//! use jobwatch::{JobwatchConfig, RedisStore, StatusTracker};
//! use std::sync::Arc;
//!
//! # async fn wiring() -> anyhow::Result<()> {
//! let config = JobwatchConfig::load()?;
//! let store = Arc::new(RedisStore::connect(&config.redis.url).await?);
//! let tracker = StatusTracker::new(store, config.tracker);
//! jobwatch::signal::install(tracker.clone());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod job;
pub mod keys;
pub mod progress;
pub mod query;
pub mod signal;
pub mod status;
pub mod store;
pub mod tracker;

pub use config::{JobwatchConfig, RedisConfig, TrackerConfig, DEFAULT_EXPIRY};
pub use error::{ExecError, StoreError};
pub use job::Trackable;
pub use keys::JobId;
pub use progress::Reporter;
pub use query::{StatusClient, StatusEvent, StatusRecord};
pub use signal::Hook;
pub use status::Status;
pub use store::{MemoryStore, RedisStore, StatusStore};
pub use tracker::StatusTracker;
