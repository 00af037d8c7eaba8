//! The status state machine: interception around enqueue and execution.

use crate::config::{TrackerConfig, DEFAULT_EXPIRY};
use crate::error::{ExecError, StoreError};
use crate::job::Trackable;
use crate::keys::{self, JobId};
use crate::progress::Reporter;
use crate::query::StatusEvent;
use crate::status::Status;
use crate::store::StatusStore;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Bound on each best-effort store write made while the process is being
/// torn down.
const INTERRUPT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Write a record update and notify subscribers.
///
/// The single write protocol shared by every record mutation: set the fields,
/// re-apply the TTL window, then publish the changed field names to the
/// job's channel and the global channel.
pub(crate) async fn store_record(
    store: &dyn StatusStore,
    id: &JobId,
    fields: &[(String, String)],
    expiration: u64,
) -> Result<(), StoreError> {
    let key = keys::status_key(id);
    store.set_fields(&key, fields).await?;
    store.expire(&key, expiration).await?;

    let event = StatusEvent {
        job_id: id.clone(),
        changed: fields.iter().map(|(field, _)| field.clone()).collect(),
    };
    let payload = serde_json::to_string(&event)?;
    store.publish(&keys::job_channel(id), &payload).await?;
    store.publish(keys::GLOBAL_CHANNEL, &payload).await?;
    Ok(())
}

fn transition_fields(status: Status) -> Vec<(String, String)> {
    vec![
        ("status".to_string(), status.as_str().to_string()),
        (
            "update_time".to_string(),
            Utc::now().timestamp().to_string(),
        ),
    ]
}

/// Drives job status records through their lifecycle.
///
/// One tracker per process, shared with the job framework's enqueue and
/// execution hooks. Holds the tracking policy and the table of currently
/// executing tracked jobs consulted by the termination hook.
#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn StatusStore>,
    config: TrackerConfig,
    running: Arc<RwLock<HashMap<JobId, u64>>>,
}

impl StatusTracker {
    /// Create a tracker over `store` with the given policy.
    #[must_use]
    pub fn new(store: Arc<dyn StatusStore>, config: TrackerConfig) -> Self {
        Self {
            store,
            config,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn is_tracked<J>(&self, job: &J) -> bool
    where
        J: Trackable + ?Sized,
    {
        job.tracked() || self.config.all_jobs
    }

    /// TTL for this job's record: the job type's own expiration wins over the
    /// configured global, which wins over [`DEFAULT_EXPIRY`].
    fn resolve_expiration<J>(&self, job: &J) -> u64
    where
        J: Trackable + ?Sized,
    {
        job.expiration()
            .or(self.config.expiration)
            .unwrap_or(DEFAULT_EXPIRY)
    }

    /// Record a job as `queued` at enqueue time.
    ///
    /// No-op unless tracking is enabled for this job type. `args` is stored
    /// alongside the status for later inspection by queriers.
    ///
    /// # Errors
    ///
    /// Returns error if a store write fails; the caller's enqueue should fail
    /// with it rather than leave reality and recorded status out of sync.
    pub async fn on_enqueue<J>(
        &self,
        job: &J,
        id: &JobId,
        args: Option<&serde_json::Value>,
    ) -> Result<(), StoreError>
    where
        J: Trackable + ?Sized,
    {
        if !self.is_tracked(job) {
            return Ok(());
        }

        let expiration = self.resolve_expiration(job);
        let mut fields = transition_fields(Status::Queued);
        if let Some(args) = args {
            fields.push(("args".to_string(), serde_json::to_string(args)?));
        }

        store_record(self.store.as_ref(), id, &fields, expiration).await?;
        info!(job_id = %id, status = %Status::Queued, "Status transition");
        Ok(())
    }

    /// Run `body` with status interception.
    ///
    /// For tracked jobs: records `working`, runs the body, then records
    /// `complete` or `failed`. A body error is always recorded and then
    /// returned unchanged as [`ExecError::Job`]; failure handling upstream
    /// (retries, dead-lettering) sees exactly the error the body produced.
    /// Untracked jobs run the body with no record mutation at all.
    ///
    /// # Errors
    ///
    /// [`ExecError::Store`] if a status write fails while the job itself has
    /// not failed; [`ExecError::Job`] for the body's own error.
    pub async fn around_execution<J, F, Fut, T, E>(
        &self,
        job: &J,
        id: &JobId,
        body: F,
    ) -> Result<T, ExecError<E>>
    where
        J: Trackable + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.is_tracked(job) {
            return body().await.map_err(ExecError::Job);
        }

        let expiration = self.resolve_expiration(job);
        self.transition(id, Status::Working, expiration).await?;
        self.running.write().insert(id.clone(), expiration);
        // Removal must also happen when the body panics or the execution
        // task is dropped mid-await.
        let entry = RunningGuard {
            table: &self.running,
            id,
        };

        let result = body().await;
        drop(entry);

        match result {
            Ok(value) => {
                self.transition(id, Status::Complete, expiration).await?;
                Ok(value)
            }
            Err(e) => {
                // The job's own failure outranks a failure to record it.
                if let Err(store_err) = self.transition(id, Status::Failed, expiration).await {
                    error!(error = %store_err, job_id = %id, "Recording failed status failed");
                }
                Err(ExecError::Job(e))
            }
        }
    }

    /// Best-effort sweep marking every currently running job `interrupted`.
    ///
    /// Called from the termination hook while the process is dying. Each
    /// store write is bounded by a short timeout, and failures are swallowed;
    /// teardown is never blocked on the store. Jobs whose write is lost stay
    /// `working` until their TTL clears them, which is the documented
    /// limitation of abnormal termination.
    pub async fn interrupt_running(&self) {
        let snapshot: Vec<(JobId, u64)> = self
            .running
            .read()
            .iter()
            .map(|(id, expiration)| (id.clone(), *expiration))
            .collect();

        for (id, expiration) in snapshot {
            let fields = transition_fields(Status::Interrupted);
            let write = store_record(self.store.as_ref(), &id, &fields, expiration);
            match tokio::time::timeout(INTERRUPT_WRITE_TIMEOUT, write).await {
                Ok(Ok(())) => info!(job_id = %id, status = %Status::Interrupted, "Status transition"),
                Ok(Err(e)) => warn!(error = %e, job_id = %id, "Interrupted-status write failed"),
                Err(_) => warn!(job_id = %id, "Interrupted-status write timed out"),
            }
        }

        self.running.write().clear();
    }

    /// Jobs currently executing under this tracker's interception.
    #[must_use]
    pub fn running_jobs(&self) -> Vec<JobId> {
        self.running.read().keys().cloned().collect()
    }

    /// Progress reporter for in-job code, carrying this job's resolved TTL.
    #[must_use]
    pub fn reporter<J>(&self, job: &J, id: &JobId) -> Reporter
    where
        J: Trackable + ?Sized,
    {
        Reporter::new(
            Arc::clone(&self.store),
            id.clone(),
            self.resolve_expiration(job),
        )
    }

    async fn transition(
        &self,
        id: &JobId,
        status: Status,
        expiration: u64,
    ) -> Result<(), StoreError> {
        let fields = transition_fields(status);
        store_record(self.store.as_ref(), id, &fields, expiration).await?;
        info!(job_id = %id, status = %status, "Status transition");
        Ok(())
    }
}

/// Running-table entry for one execution, removed on drop. Unwinding and
/// cancelled executions clean up the same way completed ones do.
struct RunningGuard<'a> {
    table: &'a RwLock<HashMap<JobId, u64>>,
    id: &'a JobId,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.table.write().remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct Untracked;
    impl Trackable for Untracked {}

    struct Tracked;
    impl Trackable for Tracked {
        fn tracked(&self) -> bool {
            true
        }
    }

    struct PinnedExpiry;
    impl Trackable for PinnedExpiry {
        fn tracked(&self) -> bool {
            true
        }
        fn expiration(&self) -> Option<u64> {
            Some(7200)
        }
    }

    fn tracker_with(config: TrackerConfig) -> (Arc<MemoryStore>, StatusTracker) {
        let store = Arc::new(MemoryStore::new());
        let tracker = StatusTracker::new(store.clone(), config);
        (store, tracker)
    }

    #[test]
    fn test_expiration_resolution_order() {
        let (_, bare) = tracker_with(TrackerConfig::default());
        assert_eq!(bare.resolve_expiration(&Tracked), DEFAULT_EXPIRY);

        let (_, global) = tracker_with(TrackerConfig {
            expiration: Some(3600),
            all_jobs: false,
        });
        assert_eq!(global.resolve_expiration(&Tracked), 3600);
        assert_eq!(global.resolve_expiration(&PinnedExpiry), 7200);
    }

    #[test]
    fn test_tracking_decision() {
        let (_, opt_in) = tracker_with(TrackerConfig::default());
        assert!(!opt_in.is_tracked(&Untracked));
        assert!(opt_in.is_tracked(&Tracked));

        let (_, all) = tracker_with(TrackerConfig {
            expiration: None,
            all_jobs: true,
        });
        assert!(all.is_tracked(&Untracked));
    }

    #[tokio::test]
    async fn test_enqueue_writes_queued_record_with_args() {
        let (store, tracker) = tracker_with(TrackerConfig::default());
        let id = JobId::new("job-1");
        let args = serde_json::json!(["csv", 42]);

        tracker.on_enqueue(&Tracked, &id, Some(&args)).await.unwrap();

        let key = keys::status_key(&id);
        assert_eq!(
            store.get_field(&key, "status").await.unwrap().as_deref(),
            Some("queued")
        );
        let stored_args = store.get_field(&key, "args").await.unwrap();
        assert_eq!(stored_args.as_deref(), Some("[\"csv\",42]"));
        assert!(store.get_field(&key, "update_time").await.unwrap().is_some());
        assert!(store.ttl(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_enqueue_untracked_is_noop() {
        let (store, tracker) = tracker_with(TrackerConfig::default());
        let id = JobId::new("job-2");

        tracker.on_enqueue(&Untracked, &id, None).await.unwrap();

        assert!(store.get_all(&keys::status_key(&id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_untracked_execution_passes_through() {
        let (store, tracker) = tracker_with(TrackerConfig::default());
        let id = JobId::new("job-3");

        let value = tracker
            .around_execution(&Untracked, &id, || async { Ok::<_, StoreError>(21 * 2) })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert!(store.get_all(&keys::status_key(&id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_running_table_emptied_after_execution() {
        let (_, tracker) = tracker_with(TrackerConfig::default());
        let id = JobId::new("job-4");

        tracker
            .around_execution(&Tracked, &id, || async { Ok::<_, StoreError>(()) })
            .await
            .unwrap();

        assert!(tracker.running.read().is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_with_nothing_running_is_noop() {
        let (store, tracker) = tracker_with(TrackerConfig::default());
        tracker.interrupt_running().await;
        assert!(store.get_all("jobwatch:status:ghost").await.unwrap().is_empty());
    }
}
