//! Failure-mode tests: store outages on the hot path and during teardown.
//!
//! Uses two trait doubles: one store that refuses every operation, and one
//! that delegates to the in-process store until a configured write, then
//! refuses. Together they pin the error contract: normal-flow outages
//! propagate, a job's own failure is never masked by one, and the
//! termination sweep swallows everything.

use async_trait::async_trait;
use futures_util::StreamExt;
use jobwatch::store::{ChannelMessage, MessageStream, StatusStore};
use jobwatch::{
    ExecError, JobId, MemoryStore, Reporter, Status, StatusClient, StatusTracker, StoreError,
    Trackable, TrackerConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Tracked;
impl Trackable for Tracked {
    fn tracked(&self) -> bool {
        true
    }
}

#[derive(Debug, thiserror::Error)]
#[error("job blew up: {0}")]
struct JobFailure(&'static str);

fn refused() -> StoreError {
    StoreError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

/// Store with no backing service at all.
struct DownStore;

#[async_trait]
impl StatusStore for DownStore {
    async fn set_fields(&self, _: &str, _: &[(String, String)]) -> Result<(), StoreError> {
        Err(refused())
    }
    async fn get_field(&self, _: &str, _: &str) -> Result<Option<String>, StoreError> {
        Err(refused())
    }
    async fn get_all(&self, _: &str) -> Result<HashMap<String, String>, StoreError> {
        Err(refused())
    }
    async fn delete(&self, _: &str) -> Result<(), StoreError> {
        Err(refused())
    }
    async fn expire(&self, _: &str, _: u64) -> Result<(), StoreError> {
        Err(refused())
    }
    async fn ttl(&self, _: &str) -> Result<Option<u64>, StoreError> {
        Err(refused())
    }
    async fn publish(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Err(refused())
    }
    async fn subscribe(&self, _: &[String]) -> Result<MessageStream, StoreError> {
        Err(refused())
    }
}

/// Store that starts refusing field writes from the nth call onward.
struct FlakyStore {
    inner: MemoryStore,
    writes: AtomicUsize,
    fail_from: usize,
}

impl FlakyStore {
    fn failing_from(fail_from: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            writes: AtomicUsize::new(0),
            fail_from,
        }
    }
}

#[async_trait]
impl StatusStore for FlakyStore {
    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        let call = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.fail_from {
            return Err(refused());
        }
        self.inner.set_fields(key, fields).await
    }
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_field(key, field).await
    }
    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.inner.get_all(key).await
    }
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        self.inner.expire(key, ttl_seconds).await
    }
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.inner.ttl(key).await
    }
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        self.inner.publish(channel, payload).await
    }
    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, StoreError> {
        self.inner.subscribe(channels).await
    }
}

/// Test that an enqueue-time store outage fails the enqueue.
#[tokio::test]
async fn test_enqueue_store_outage_propagates() {
    let tracker = StatusTracker::new(Arc::new(DownStore), TrackerConfig::default());
    let id = JobId::new("doomed");

    let result = tracker.on_enqueue(&Tracked, &id, None).await;
    assert!(matches!(result, Err(StoreError::Redis(_))));
}

/// Test that a failing working-transition surfaces before the body runs.
#[tokio::test]
async fn test_working_transition_outage_skips_body() {
    let tracker = StatusTracker::new(Arc::new(DownStore), TrackerConfig::default());
    let id = JobId::new("doomed");
    let body_ran = Arc::new(AtomicBool::new(false));

    let result = {
        let body_ran = body_ran.clone();
        tracker
            .around_execution(&Tracked, &id, move || async move {
                body_ran.store(true, Ordering::SeqCst);
                Ok::<_, JobFailure>(())
            })
            .await
    };

    assert!(matches!(result, Err(ExecError::Store(_))));
    assert!(!body_ran.load(Ordering::SeqCst));
}

/// Test that untracked jobs never touch the store at all.
#[tokio::test]
async fn test_untracked_job_ignores_store_outage() {
    struct Untracked;
    impl Trackable for Untracked {}

    let tracker = StatusTracker::new(Arc::new(DownStore), TrackerConfig::default());
    let id = JobId::new("unaffected");

    tracker.on_enqueue(&Untracked, &id, None).await.expect("Should be a no-op");
    let value = tracker
        .around_execution(&Untracked, &id, || async { Ok::<_, JobFailure>(5) })
        .await
        .expect("Should pass through");
    assert_eq!(value, 5);
}

/// Test that the job's own error wins when recording `failed` also fails.
#[tokio::test]
async fn test_job_error_outranks_terminal_write_outage() {
    // First field write (working) succeeds, second (failed) is refused.
    let store = Arc::new(FlakyStore::failing_from(2));
    let tracker = StatusTracker::new(store.clone(), TrackerConfig::default());
    let client = StatusClient::new(store);
    let id = JobId::new("unlucky");

    let result = tracker
        .around_execution(&Tracked, &id, || async {
            Err::<(), _>(JobFailure("corrupt input"))
        })
        .await;

    match result {
        Err(ExecError::Job(e)) => assert_eq!(e.to_string(), "job blew up: corrupt input"),
        other => panic!("Expected the job's own error, got {other:?}"),
    }

    // The lost terminal write leaves the record at `working` until its TTL
    // clears it.
    assert_eq!(client.status(&id).await.unwrap(), Some(Status::Working));
}

/// Test that a lost `complete` write surfaces as a store error even though
/// the body succeeded.
#[tokio::test]
async fn test_complete_write_outage_surfaces_after_success() {
    // First field write (working) succeeds, second (complete) is refused.
    let store = Arc::new(FlakyStore::failing_from(2));
    let tracker = StatusTracker::new(store.clone(), TrackerConfig::default());
    let client = StatusClient::new(store);
    let id = JobId::new("half-recorded");

    let body_ran = Arc::new(AtomicBool::new(false));
    let result = {
        let body_ran = body_ran.clone();
        tracker
            .around_execution(&Tracked, &id, move || async move {
                body_ran.store(true, Ordering::SeqCst);
                Ok::<_, JobFailure>("artifact")
            })
            .await
    };

    assert!(body_ran.load(Ordering::SeqCst));
    assert!(matches!(result, Err(ExecError::Store(_))));
    assert!(tracker.running_jobs().is_empty());

    // The record stays `working` until its TTL clears it.
    assert_eq!(client.status(&id).await.unwrap(), Some(Status::Working));
}

/// Test that the termination sweep swallows store outages.
#[tokio::test(flavor = "multi_thread")]
async fn test_termination_sweep_swallows_outage() {
    let store = Arc::new(FlakyStore::failing_from(2));
    let tracker = StatusTracker::new(store.clone(), TrackerConfig::default());
    let client = StatusClient::new(store);
    let id = JobId::new("stuck");

    let exec = {
        let tracker = tracker.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tracker
                .around_execution(&Tracked, &id, || async {
                    futures_util::future::pending::<Result<(), JobFailure>>().await
                })
                .await
        })
    };

    tokio::time::timeout(Duration::from_secs(2), async {
        while tracker.running_jobs().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timeout waiting for running job");

    // Must return despite the store refusing the interrupted write.
    tracker.interrupt_running().await;
    exec.abort();

    assert!(tracker.running_jobs().is_empty());
    assert_eq!(client.status(&id).await.unwrap(), Some(Status::Working));
}

/// Test that reporter writes surface store outages but drop missing-record
/// updates silently.
#[tokio::test]
async fn test_reporter_outage_propagates() {
    let down = StatusTracker::new(Arc::new(DownStore), TrackerConfig::default());
    let id = JobId::new("reporting");
    let reporter: Reporter = down.reporter(&Tracked, &id);

    let result = reporter
        .update(vec![("message".to_string(), "half done".to_string())])
        .await;
    assert!(matches!(result, Err(StoreError::Redis(_))));

    let healthy = StatusTracker::new(Arc::new(MemoryStore::new()), TrackerConfig::default());
    let reporter = healthy.reporter(&Tracked, &id);
    reporter
        .update(vec![("message".to_string(), "half done".to_string())])
        .await
        .expect("Missing record should drop the update, not error");
}

/// Test that subscriptions cannot be established against a down store.
#[tokio::test]
async fn test_subscribe_outage_surfaces() {
    let client = StatusClient::new(Arc::new(DownStore));
    assert!(client.subscribe(None).await.is_err());
}

/// Test that a down store still yields errors, not panics, on every query.
#[tokio::test]
async fn test_queries_against_down_store_error_cleanly() {
    let client = StatusClient::new(Arc::new(DownStore));
    let id = JobId::new("unreachable");

    assert!(client.status(&id).await.is_err());
    assert!(client.is_complete(&id).await.is_err());
    assert!(client.get_all(&id).await.is_err());
    assert!(client.ttl(&id).await.is_err());
    assert!(client.delete(&id).await.is_err());
}

/// Test that the flaky double faithfully relays pub/sub when not failing.
#[tokio::test]
async fn test_flaky_store_delegates_pubsub() {
    let store = FlakyStore::failing_from(100);
    let mut sub = store.subscribe(&["chan".to_string()]).await.unwrap();
    store.publish("chan", "payload").await.unwrap();

    let message: ChannelMessage = tokio::time::timeout(Duration::from_secs(1), sub.next())
        .await
        .expect("Timeout")
        .expect("Stream ended");
    assert_eq!(message.payload, "payload");
}
