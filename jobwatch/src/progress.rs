//! Progress reporting from inside a running job.

use crate::error::StoreError;
use crate::keys::{self, JobId};
use crate::store::StatusStore;
use crate::tracker::store_record;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Reports progress for one job from within its own execution.
///
/// Obtained from [`StatusTracker::reporter`](crate::StatusTracker::reporter)
/// and moved into the job body. Every write merges into the job's record and
/// notifies subscribers. If the job has no record (tracking was not enabled
/// for it), writes are dropped silently; only store connectivity faults
/// surface as errors.
pub struct Reporter {
    store: Arc<dyn StatusStore>,
    id: JobId,
    expiration: u64,
}

impl Reporter {
    pub(crate) fn new(store: Arc<dyn StatusStore>, id: JobId, expiration: u64) -> Self {
        Self {
            store,
            id,
            expiration,
        }
    }

    /// The job this reporter writes for.
    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        &self.id
    }

    /// Merge `fields` into the job's record and notify subscribers.
    ///
    /// Stamps `update_time` alongside the given fields and re-applies the
    /// record's TTL window.
    ///
    /// # Errors
    ///
    /// Returns error if a store operation fails. A missing record is not an
    /// error; the update is simply dropped.
    pub async fn update(&self, mut fields: Vec<(String, String)>) -> Result<(), StoreError> {
        if !self.record_exists().await? {
            debug!(job_id = %self.id, "No status record, progress update dropped");
            return Ok(());
        }

        fields.push((
            "update_time".to_string(),
            Utc::now().timestamp().to_string(),
        ));
        store_record(self.store.as_ref(), &self.id, &fields, self.expiration).await
    }

    /// Record progress as `num` of `total` units done, with an optional
    /// message. Stores `at`, `total`, and the derived `pct_complete`.
    ///
    /// # Errors
    ///
    /// Returns error if a store operation fails.
    pub async fn at(&self, num: u64, total: u64, message: Option<&str>) -> Result<(), StoreError> {
        let pct = percentage(num, total);
        let mut fields = vec![
            ("at".to_string(), num.to_string()),
            ("total".to_string(), total.to_string()),
            ("pct_complete".to_string(), pct.to_string()),
        ];
        if let Some(message) = message {
            fields.push(("message".to_string(), message.to_string()));
        }
        self.update(fields).await
    }

    /// Attach arbitrary application payload fields to the job's record.
    ///
    /// # Errors
    ///
    /// Returns error if a store operation fails.
    pub async fn store(&self, fields: Vec<(String, String)>) -> Result<(), StoreError> {
        self.update(fields).await
    }

    /// Read back one field of the job's own record.
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn retrieve(&self, field: &str) -> Result<Option<String>, StoreError> {
        self.store
            .get_field(&keys::status_key(&self.id), field)
            .await
    }

    async fn record_exists(&self) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get_field(&keys::status_key(&self.id), "status")
            .await?
            .is_some())
    }
}

fn percentage(num: u64, total: u64) -> u64 {
    (num.saturating_mul(100) / total.max(1)).min(100)
}
