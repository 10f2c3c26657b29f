//! Redis Streams-backed retry queue (durable, at-least-once delivery).
//!
//! ## Architecture
//!
//! - **Stream key**: `reorderApi` by default (one stream per queue name)
//! - **Consumer group**: created on connect with `MKSTREAM`, idempotent
//! - **Entry fields**: `body` (plain-text payload), `delivery_count`
//!
//! ## Acknowledgement
//!
//! - `ack`: `XACK` + `XDEL`
//! - `nack(requeue = true)`: `XADD` a copy with an incremented delivery count,
//!   then `XACK` + `XDEL` the original, in one `MULTI/EXEC`
//! - `nack(requeue = false)`: `XACK` + `XDEL`, logged
//!
//! Entries that were delivered to this consumer but never settled (process
//! died mid-replay) stay in the group's pending list and are handed out again
//! first after a restart, as long as the consumer name is stable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use ::redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use playsort_events::{Delivery, MessageQueue, QueueError};

pub const DEFAULT_STREAM_KEY: &str = "reorderApi";
pub const DEFAULT_GROUP: &str = "playsort.retry";
pub const DEFAULT_CONSUMER: &str = "retry-consumer-1";

const BODY_FIELD: &str = "body";
const DELIVERY_COUNT_FIELD: &str = "delivery_count";

#[derive(Debug, Clone)]
pub struct RedisStreamsConfig {
    pub stream_key: String,
    pub group: String,
    /// Must be stable across restarts for pending entries to be recovered.
    pub consumer: String,
}

impl Default for RedisStreamsConfig {
    fn default() -> Self {
        Self {
            stream_key: DEFAULT_STREAM_KEY.to_string(),
            group: DEFAULT_GROUP.to_string(),
            consumer: DEFAULT_CONSUMER.to_string(),
        }
    }
}

impl RedisStreamsConfig {
    pub fn with_stream_key(mut self, key: impl Into<String>) -> Self {
        self.stream_key = key.into();
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),
}

impl From<RedisStreamsError> for QueueError {
    fn from(value: RedisStreamsError) -> Self {
        match value {
            RedisStreamsError::Connection(msg) => QueueError::Connection(msg),
            RedisStreamsError::Command(msg) | RedisStreamsError::ConsumerGroup(msg) => QueueError::Command(msg),
        }
    }
}

pub struct RedisStreamsQueue {
    /// Publishes and acks.
    conn: MultiplexedConnection,
    /// Blocking reads get their own connection so they never stall publishes.
    read_conn: MultiplexedConnection,
    config: RedisStreamsConfig,
    recovering: AtomicBool,
}

impl std::fmt::Debug for RedisStreamsQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamsQueue")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStreamsQueue {
    /// Connect and make sure the consumer group exists.
    pub async fn connect(
        redis_url: impl AsRef<str>,
        config: RedisStreamsConfig,
    ) -> Result<Self, RedisStreamsError> {
        let client = ::redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;
        let read_conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

        let queue = Self {
            conn,
            read_conn,
            config,
            recovering: AtomicBool::new(true),
        };
        queue.ensure_consumer_group().await?;
        Ok(queue)
    }

    pub fn stream_key(&self) -> &str {
        &self.config.stream_key
    }

    /// `XGROUP CREATE … MKSTREAM`; an existing group is fine.
    async fn ensure_consumer_group(&self) -> Result<(), RedisStreamsError> {
        let mut conn = self.conn.clone();
        let created: ::redis::RedisResult<()> = ::redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_key)
            .arg(&self.config.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => {
                info!(stream_key = %self.config.stream_key, group = %self.config.group, "consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(RedisStreamsError::ConsumerGroup(e.to_string())),
        }
    }

    /// Read one entry starting after `start` (`"0"` = own pending list, `">"` = new).
    async fn read_one(&self, start: &str, block: Option<Duration>) -> Result<Option<StreamId>, RedisStreamsError> {
        let mut opts = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(1);
        if let Some(block) = block {
            // BLOCK 0 would wait forever.
            opts = opts.block(block.as_millis().max(1) as usize);
        }

        let mut conn = self.read_conn.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.stream_key], &[start], &opts)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XREADGROUP failed: {e}")))?;

        Ok(reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|k| k.ids.into_iter().next()))
    }

    fn to_delivery(entry: StreamId) -> Delivery {
        let body: String = entry.get(BODY_FIELD).unwrap_or_default();
        let previous: u32 = entry.get(DELIVERY_COUNT_FIELD).unwrap_or(0);
        Delivery {
            tag: entry.id,
            body,
            delivery_count: previous.saturating_add(1),
        }
    }

    async fn settle(&self, delivery: &Delivery, requeue: bool) -> Result<(), RedisStreamsError> {
        let key = &self.config.stream_key;
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        if requeue {
            pipe.xadd(
                key,
                "*",
                &[
                    (BODY_FIELD, delivery.body.clone()),
                    (DELIVERY_COUNT_FIELD, delivery.delivery_count.to_string()),
                ],
            )
            .ignore();
        }
        pipe.xack(key, &self.config.group, &[&delivery.tag])
            .ignore()
            .xdel(key, &[&delivery.tag])
            .ignore();

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("settle {} failed: {e}", delivery.tag)))
    }
}

#[async_trait]
impl MessageQueue for RedisStreamsQueue {
    #[instrument(skip(self, body), fields(stream_key = %self.config.stream_key), err)]
    async fn publish(&self, body: String) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(
                &self.config.stream_key,
                "*",
                &[(BODY_FIELD, body.as_str()), (DELIVERY_COUNT_FIELD, "0")],
            )
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XADD failed: {e}")))?;
        debug!(message_id = %id, "published");
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        if self.recovering.load(Ordering::Acquire) {
            if let Some(entry) = self.read_one("0", None).await? {
                debug!(message_id = %entry.id, "redelivering pending entry");
                return Ok(Some(Self::to_delivery(entry)));
            }
            self.recovering.store(false, Ordering::Release);
        }

        let block = (!wait.is_zero()).then_some(wait);
        Ok(self.read_one(">", block).await?.map(Self::to_delivery))
    }

    #[instrument(skip(self, delivery), fields(message_id = %delivery.tag), err)]
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        Ok(self.settle(delivery, false).await?)
    }

    #[instrument(skip(self, delivery), fields(message_id = %delivery.tag), err)]
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        self.settle(delivery, requeue).await?;
        if !requeue {
            warn!(message_id = %delivery.tag, "message dropped without requeue");
        }
        Ok(())
    }
}
