//! Status store adapter: the atomic operations the tracking layer needs.
//!
//! Everything above this module talks to the store through [`StatusStore`],
//! so the Redis deployment and the in-process store are interchangeable.

use crate::error::StoreError;
use async_trait::async_trait;
use futures_util::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// A message received from a subscribed channel.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Channel the message arrived on.
    pub channel: String,
    /// Raw payload as published.
    pub payload: String,
}

/// Stream of messages from a subscription, live until dropped.
pub type MessageStream = Pin<Box<dyn Stream<Item = ChannelMessage> + Send>>;

/// Atomic operations against the shared status store.
///
/// Each operation is a single round-trip, atomic at field-set granularity.
/// Callers never rely on cross-key transactions; correctness of the tracking
/// layer rests only on per-key atomicity and program-order writes.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Set several fields of the hash at `key` in one atomic write.
    ///
    /// Creates the hash if absent. Does not touch any TTL already attached
    /// to the key.
    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError>;

    /// Read a single field of the hash at `key`.
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Read the whole hash at `key`. An absent key yields an empty map.
    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Delete the hash at `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Attach a TTL in seconds to `key`, replacing any existing expiry.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StoreError>;

    /// Remaining TTL of `key` in seconds, rounded up.
    ///
    /// `None` if the key does not exist or carries no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Publish a payload to a channel. Delivery is at-most-once; publishing
    /// with no subscribers is not an error.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Subscribe to the given channels.
    ///
    /// Lossy: messages published before the subscription is established, or
    /// while the consumer lags, are never redelivered.
    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, StoreError>;
}
