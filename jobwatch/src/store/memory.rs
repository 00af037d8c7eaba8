//! In-process status store.
//!
//! Backs tests and single-process deployments. TTLs are enforced lazily: an
//! expired key reads as absent and is dropped on the next write that touches
//! it. Pub/sub fans out over a broadcast channel, so delivery matches the
//! Redis semantics the tracking layer assumes: no replay, and a lagging
//! consumer loses the oldest messages rather than blocking publishers.

use super::{ChannelMessage, MessageStream, StatusStore};
use crate::error::StoreError;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Fan-out capacity per store. Subscribers lagging behind this many messages
/// start losing the oldest ones.
const CHANNEL_CAPACITY: usize = 1024;

struct Entry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| at > Instant::now())
    }
}

/// In-memory [`StatusStore`].
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    sender: broadcast::Sender<ChannelMessage>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            sender,
        }
    }

    fn drop_if_expired(entries: &mut HashMap<String, Entry>, key: &str) {
        if entries.get(key).is_some_and(|e| !e.is_live()) {
            entries.remove(key);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        Self::drop_if_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            fields: HashMap::new(),
            expires_at: None,
        });
        for (field, value) in fields {
            entry.fields.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live())
            .and_then(|e| e.fields.get(field).cloned()))
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.fields.clone())
            .unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        Self::drop_if_expired(&mut entries, key);
        if let Some(entry) = entries.get_mut(key) {
            // A TTL that overflows Instant is a deadline the process can
            // never reach; store it as no expiry.
            entry.expires_at = Instant::now().checked_add(Duration::from_secs(ttl_seconds));
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live())
            .and_then(|e| e.expires_at)
            .map(|at| {
                // Round up, matching how Redis reports partial seconds.
                let remaining = at.saturating_duration_since(Instant::now());
                remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
            }))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let message = ChannelMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        // A send error only means no subscribers are listening.
        let _ = self.sender.send(message);
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, StoreError> {
        let rx = self.sender.subscribe();
        let wanted: Vec<String> = channels.to_vec();

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, rx)),
                    // Lagged consumers skip lost messages, they do not error.
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |message| futures_util::future::ready(wanted.contains(&message.channel)));

        Ok(stream.boxed())
    }
}
