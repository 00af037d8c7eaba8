//! Read-side API: status queries, structured records, live subscriptions.

use crate::error::StoreError;
use crate::keys::{self, JobId};
use crate::status::Status;
use crate::store::StatusStore;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Notification published on every record update.
///
/// Carries which fields changed, not their values; subscribers read the
/// record for current data. Delivery is at-most-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Job the update belongs to.
    pub job_id: JobId,
    /// Names of the fields written by the update.
    pub changed: Vec<String>,
}

/// Decoded snapshot of one job's status record.
///
/// Every field is optional: records written by older versions, or mutated by
/// application-defined progress payloads, still decode. Unrecognized fields
/// land in [`extra`](Self::extra).
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    /// Current lifecycle state.
    pub status: Option<Status>,
    /// Time of the last transition or progress write.
    pub update_time: Option<DateTime<Utc>>,
    /// Job arguments captured at enqueue time.
    pub args: Option<serde_json::Value>,
    /// Progress percentage, 0 to 100.
    pub pct_complete: Option<u8>,
    /// Progress numerator from the last `at` call.
    pub at: Option<u64>,
    /// Progress denominator from the last `at` call.
    pub total: Option<u64>,
    /// Human-readable progress message.
    pub message: Option<String>,
    /// Application-defined payload fields.
    pub extra: HashMap<String, String>,
}

impl StatusRecord {
    fn from_fields(mut fields: HashMap<String, String>) -> Self {
        let status = fields.remove("status").and_then(|s| s.parse().ok());
        let update_time = fields
            .remove("update_time")
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        let args = fields
            .remove("args")
            .and_then(|s| serde_json::from_str(&s).ok());
        let pct_complete = fields.remove("pct_complete").and_then(|s| s.parse().ok());
        let at = fields.remove("at").and_then(|s| s.parse().ok());
        let total = fields.remove("total").and_then(|s| s.parse().ok());
        let message = fields.remove("message");

        Self {
            status,
            update_time,
            args,
            pct_complete,
            at,
            total,
            message,
            extra: fields,
        }
    }
}

/// Read-side client for job status.
///
/// Absent records are never an error: status yields `None`, predicates yield
/// `false`, [`get_all`](Self::get_all) yields `None`. Only store connectivity
/// faults surface as errors.
#[derive(Clone)]
pub struct StatusClient {
    store: Arc<dyn StatusStore>,
}

impl StatusClient {
    /// Create a client over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// Current status of a job, `None` if untracked or expired.
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn status(&self, id: &JobId) -> Result<Option<Status>, StoreError> {
        let raw = self
            .store
            .get_field(&keys::status_key(id), "status")
            .await?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }

    /// Is the job's current status exactly `queued`?
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn is_queued(&self, id: &JobId) -> Result<bool, StoreError> {
        Ok(self.status(id).await? == Some(Status::Queued))
    }

    /// Is the job's current status exactly `working`?
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn is_working(&self, id: &JobId) -> Result<bool, StoreError> {
        Ok(self.status(id).await? == Some(Status::Working))
    }

    /// Is the job's current status exactly `complete`?
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn is_complete(&self, id: &JobId) -> Result<bool, StoreError> {
        Ok(self.status(id).await? == Some(Status::Complete))
    }

    /// Is the job's current status exactly `failed`?
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn is_failed(&self, id: &JobId) -> Result<bool, StoreError> {
        Ok(self.status(id).await? == Some(Status::Failed))
    }

    /// Is the job's current status exactly `interrupted`?
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn is_interrupted(&self, id: &JobId) -> Result<bool, StoreError> {
        Ok(self.status(id).await? == Some(Status::Interrupted))
    }

    /// One field of the job's record, `None` if the record or field is absent.
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn get(&self, id: &JobId, field: &str) -> Result<Option<String>, StoreError> {
        self.store.get_field(&keys::status_key(id), field).await
    }

    /// The whole record, decoded. `None` if the job is untracked or expired.
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn get_all(&self, id: &JobId) -> Result<Option<StatusRecord>, StoreError> {
        let fields = self.store.get_all(&keys::status_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(StatusRecord::from_fields(fields)))
    }

    /// Remaining TTL of the job's record in seconds.
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn ttl(&self, id: &JobId) -> Result<Option<u64>, StoreError> {
        self.store.ttl(&keys::status_key(id)).await
    }

    /// Drop the job's record ahead of its TTL.
    ///
    /// # Errors
    ///
    /// Returns error if the store write fails.
    pub async fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        self.store.delete(&keys::status_key(id)).await
    }

    /// Live updates for one job, or for all jobs when `id` is `None`.
    ///
    /// The stream starts at subscription time and is lossy: events published
    /// earlier are never replayed, and a lagging consumer may miss
    /// intermediate events. Undecodable payloads are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription cannot be established.
    pub async fn subscribe(
        &self,
        id: Option<&JobId>,
    ) -> Result<impl Stream<Item = StatusEvent> + Send, StoreError> {
        let channel = id.map_or_else(|| keys::GLOBAL_CHANNEL.to_string(), keys::job_channel);
        let messages = self.store.subscribe(&[channel]).await?;

        Ok(messages.filter_map(|message| {
            let event = serde_json::from_str::<StatusEvent>(&message.payload).ok();
            futures_util::future::ready(event)
        }))
    }
}
