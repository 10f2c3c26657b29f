//! Durable message queue abstraction (mechanics only).
//!
//! The retry pipeline needs a single named queue with **manual acknowledgement**:
//!
//! - `ack`: processing succeeded, remove the message
//! - `nack(requeue = true)`: transient failure, deliver again later
//! - `nack(requeue = false)`: malformed payload, drop permanently
//!
//! ## Delivery Guarantees
//!
//! At-least-once. A message that was received but never acked or nacked (e.g.
//! the process died) may be delivered again; consumers must tolerate replays.
//! There is no ordering guarantee beyond what the backing broker provides, and
//! no attempt counting: a message nacked with requeue comes back forever.
//!
//! ## Thread Safety
//!
//! Implementations are `Send + Sync` and shared behind an `Arc`. Producers may
//! publish concurrently; the retry consumer is the only receiver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A message handed to a consumer, awaiting ack or nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned handle used to ack/nack this delivery.
    pub tag: String,
    /// Plain-text body (JSON for retry instructions).
    pub body: String,
    /// How many times this body has been delivered, starting at 1.
    pub delivery_count: u32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("queue command error: {0}")]
    Command(String),

    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("unknown delivery tag: {0}")]
    UnknownDelivery(String),

    #[error("queue state poisoned")]
    Poisoned,
}

/// Named durable queue with manual acknowledgement.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a message. Synchronous from the caller's point of view: returns
    /// once the broker accepted the write.
    async fn publish(&self, body: String) -> Result<(), QueueError>;

    /// Wait up to `wait` for the next delivery. `Ok(None)` means nothing arrived.
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;
}

#[async_trait]
impl<Q> MessageQueue for Arc<Q>
where
    Q: MessageQueue + ?Sized,
{
    async fn publish(&self, body: String) -> Result<(), QueueError> {
        (**self).publish(body).await
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        (**self).receive(wait).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        (**self).ack(delivery).await
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        (**self).nack(delivery, requeue).await
    }
}
