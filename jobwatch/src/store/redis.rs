//! Redis-backed status store.

use super::{ChannelMessage, MessageStream, StatusStore};
use crate::error::StoreError;
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tracing::{debug, error};

/// Status store over a shared Redis instance.
///
/// Commands go through an auto-reconnecting [`ConnectionManager`]; each
/// subscription opens a dedicated pub/sub connection from the same client.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the connection cannot be
    /// established.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { client, conn })
    }

    /// Map a Redis TTL reply to remaining seconds. Redis reports -2 for a
    /// missing key and -1 for a key without expiry.
    fn ttl_from_reply(reply: i64) -> Option<u64> {
        u64::try_from(reply).ok()
    }

    /// Safely convert a TTL to the signed seconds EXPIRE takes.
    fn ttl_to_seconds(ttl: u64) -> i64 {
        i64::try_from(ttl).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl StatusStore for RedisStore {
    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        debug!(key = %key, fields = fields.len(), "HSET");

        let mut conn = self.conn.clone();
        conn.hset_multiple::<_, _, _, ()>(key, fields)
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "HSET failed");
                StoreError::from(e)
            })
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        debug!(key = %key, field = %field, "HGET");

        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(key, field).await.map_err(|e| {
            error!(error = %e, key = %key, "HGET failed");
            StoreError::from(e)
        })?;

        Ok(value)
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        debug!(key = %key, "HGETALL");

        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await.map_err(|e| {
            error!(error = %e, key = %key, "HGETALL failed");
            StoreError::from(e)
        })?;

        Ok(fields)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        debug!(key = %key, "DEL");

        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(|e| {
            error!(error = %e, key = %key, "DEL failed");
            StoreError::from(e)
        })
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StoreError> {
        debug!(key = %key, ttl = ttl_seconds, "EXPIRE");

        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, Self::ttl_to_seconds(ttl_seconds))
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "EXPIRE failed");
                StoreError::from(e)
            })
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        debug!(key = %key, "TTL");

        let mut conn = self.conn.clone();
        let reply: i64 = conn.ttl(key).await.map_err(|e| {
            error!(error = %e, key = %key, "TTL failed");
            StoreError::from(e)
        })?;

        Ok(Self::ttl_from_reply(reply))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        debug!(channel = %channel, "PUBLISH");

        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| {
                error!(error = %e, channel = %channel, "PUBLISH failed");
                StoreError::from(e)
            })
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, StoreError> {
        debug!(channels = ?channels, "SUBSCRIBE");

        let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
            error!(error = %e, "Opening pub/sub connection failed");
            StoreError::from(e)
        })?;
        for channel in channels {
            pubsub.subscribe(channel).await.map_err(|e| {
                error!(error = %e, channel = %channel, "SUBSCRIBE failed");
                StoreError::from(e)
            })?;
        }

        // Non-UTF-8 payloads are dropped rather than terminating the stream.
        let stream = pubsub.into_on_message().filter_map(|msg| {
            let channel = msg.get_channel_name().to_string();
            let payload = msg.get_payload::<String>().ok();
            futures_util::future::ready(payload.map(|payload| ChannelMessage { channel, payload }))
        });

        Ok(stream.boxed())
    }
}
