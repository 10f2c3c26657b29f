//! In-memory message queue for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::queue::{Delivery, MessageQueue, QueueError};

/// Default bound on messages held (ready + in flight).
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct Message {
    body: String,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<Message>,
    in_flight: HashMap<String, Message>,
    next_tag: u64,
    dropped: u64,
}

/// Bounded FIFO queue with manual acknowledgement.
///
/// - `publish` fails with `QueueError::Full` once `capacity` messages are held
/// - requeued messages go to the back of the queue
/// - no IO; lost on process exit
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    state: Mutex<State>,
    notify: Notify,
    capacity: usize,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages waiting to be delivered.
    pub fn ready_len(&self) -> usize {
        self.state.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Messages delivered but not yet acked/nacked.
    pub fn in_flight_len(&self) -> usize {
        self.state.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    /// Messages permanently dropped via `nack(requeue = false)`.
    pub fn dropped(&self) -> u64 {
        self.state.lock().map(|s| s.dropped).unwrap_or(0)
    }

    /// Bodies waiting to be delivered, front first.
    pub fn ready_bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.ready.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    fn try_take(&self) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::Poisoned)?;
        let Some(mut message) = state.ready.pop_front() else {
            return Ok(None);
        };

        message.delivery_count += 1;
        state.next_tag += 1;
        let tag = state.next_tag.to_string();

        let delivery = Delivery {
            tag: tag.clone(),
            body: message.body.clone(),
            delivery_count: message.delivery_count,
        };
        state.in_flight.insert(tag, message);
        Ok(Some(delivery))
    }

    fn settle(&self, delivery: &Delivery) -> Result<(std::sync::MutexGuard<'_, State>, Message), QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::Poisoned)?;
        let message = state
            .in_flight
            .remove(&delivery.tag)
            .ok_or_else(|| QueueError::UnknownDelivery(delivery.tag.clone()))?;
        Ok((state, message))
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, body: String) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().map_err(|_| QueueError::Poisoned)?;
            if state.ready.len() + state.in_flight.len() >= self.capacity {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
            state.ready.push_back(Message {
                body,
                delivery_count: 0,
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking so a publish in between is not missed.
            let notified = self.notify.notified();

            if let Some(delivery) = self.try_take()? {
                return Ok(Some(delivery));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return self.try_take();
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.settle(delivery).map(|_| ())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        {
            let (mut state, message) = self.settle(delivery)?;
            if requeue {
                state.ready.push_back(message);
            } else {
                state.dropped += 1;
                tracing::debug!(tag = %delivery.tag, "message dropped");
            }
        }
        if requeue {
            self.notify.notify_one();
        }
        Ok(())
    }
}
