//! Deferred-retry consumer.
//!
//! One task for the lifetime of the process, strictly sequential: a delivery
//! is fully settled (ack or nack) before the next one is received.
//!
//! | delivery | action |
//! |---|---|
//! | body is not a retry instruction | `nack(requeue = false)` |
//! | action is not `reorder_*` | `ack`, logged as not replayable |
//! | replay succeeded | `ack` |
//! | replay hit the quota again | `ack` (the classifier already queued a successor) |
//! | replay failed otherwise | `nack(requeue = true)`, then back off `poll_interval` |
//!
//! When `honor_schedule` is on, the consumer waits until the instruction's
//! `retry_at` before replaying. Shutdown interrupts the wait and puts the
//! message back on the queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use playsort_core::{PlaylistId, UserId};
use playsort_events::{Delivery, MessageQueue, RetryInstruction};

use crate::cache::SnapshotCache;
use crate::classifier::Clock;
use crate::credentials::CredentialStore;
use crate::gateway::{PlaylistGateway, PublishReport};
use crate::orchestrator::{PlaylistService, ReorderError};

/// The operation a replayed reorder instruction is fed into.
#[async_trait]
pub trait ReorderReplayer: Send + Sync {
    async fn replay_reorder(
        &self,
        playlist_id: &PlaylistId,
        criterion: &str,
        user_id: &UserId,
    ) -> Result<PublishReport, ReorderError>;
}

#[async_trait]
impl<G, C, S, Q> ReorderReplayer for PlaylistService<G, C, S, Q>
where
    G: PlaylistGateway,
    C: SnapshotCache,
    S: CredentialStore,
    Q: MessageQueue,
{
    async fn replay_reorder(
        &self,
        playlist_id: &PlaylistId,
        criterion: &str,
        user_id: &UserId,
    ) -> Result<PublishReport, ReorderError> {
        self.reorder(playlist_id, criterion, user_id).await
    }
}

#[async_trait]
impl<R> ReorderReplayer for Arc<R>
where
    R: ReorderReplayer + ?Sized,
{
    async fn replay_reorder(
        &self,
        playlist_id: &PlaylistId,
        criterion: &str,
        user_id: &UserId,
    ) -> Result<PublishReport, ReorderError> {
        (**self).replay_reorder(playlist_id, criterion, user_id).await
    }
}

/// Retry consumer configuration.
#[derive(Debug, Clone)]
pub struct RetryConsumerConfig {
    /// Name for logging
    pub name: String,
    /// How long a single receive waits for a message
    pub receive_wait: Duration,
    /// Back-off after a receive error or a requeued replay
    pub poll_interval: Duration,
    /// Wait until `retry_at` before replaying
    pub honor_schedule: bool,
}

impl Default for RetryConsumerConfig {
    fn default() -> Self {
        Self {
            name: "retry-consumer".to_string(),
            receive_wait: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            honor_schedule: true,
        }
    }
}

impl RetryConsumerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_honor_schedule(mut self, honor: bool) -> Self {
        self.honor_schedule = honor;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_receive_wait(mut self, wait: Duration) -> Self {
        self.receive_wait = wait;
        self
    }
}

/// Consumer runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConsumerStats {
    pub processed: u64,
    pub replayed: u64,
    /// Replays refused for quota again (acked, successor queued).
    pub deferred: u64,
    pub requeued: u64,
    pub dropped: u64,
    pub skipped: u64,
    pub receive_errors: u64,
}

/// How a single delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    Replayed,
    Deferred,
    Requeued,
    Dropped,
    Skipped,
    /// Shutdown arrived while waiting for `retry_at`; message requeued.
    Interrupted,
}

/// Handle to control a running consumer.
#[derive(Debug)]
pub struct RetryConsumerHandle {
    shutdown: CancellationToken,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl RetryConsumerHandle {
    /// Request graceful shutdown and wait for the consumer to stop.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                error!(error = %err, "retry consumer task failed");
            }
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

pub struct RetryConsumer<Q, R> {
    queue: Q,
    replayer: R,
    config: RetryConsumerConfig,
    clock: Clock,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl<Q, R> RetryConsumer<Q, R>
where
    Q: MessageQueue + 'static,
    R: ReorderReplayer + 'static,
{
    pub fn new(queue: Q, replayer: R, config: RetryConsumerConfig) -> Self {
        Self {
            queue,
            replayer,
            config,
            clock: Arc::new(Utc::now),
            stats: Arc::new(Mutex::new(ConsumerStats::default())),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Spawn the consumer on the current tokio runtime.
    pub fn spawn(self) -> RetryConsumerHandle {
        self.spawn_with(CancellationToken::new())
    }

    /// Spawn with an externally owned shutdown token.
    pub fn spawn_with(self, shutdown: CancellationToken) -> RetryConsumerHandle {
        let stats = self.stats.clone();
        let token = shutdown.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        RetryConsumerHandle {
            shutdown,
            join: Some(join),
            stats,
        }
    }

    /// Receive and settle deliveries until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(consumer = %self.config.name, "retry consumer started");

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                r = self.queue.receive(self.config.receive_wait) => r,
            };

            match received {
                Ok(Some(delivery)) => {
                    let outcome = self.handle(delivery, &shutdown).await;
                    if outcome == ReplayOutcome::Requeued && self.pause(&shutdown).await {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    error!(consumer = %self.config.name, error = %err, "failed to receive from retry queue");
                    self.bump(|s| s.receive_errors += 1);
                    if self.pause(&shutdown).await {
                        break;
                    }
                }
            }

            if shutdown.is_cancelled() {
                break;
            }
        }

        info!(consumer = %self.config.name, "retry consumer stopped");
    }

    /// Settle one delivery.
    #[instrument(
        skip(self, delivery, shutdown),
        fields(consumer = %self.config.name, message_id = %delivery.tag, delivery_count = delivery.delivery_count)
    )]
    pub async fn handle(&self, delivery: Delivery, shutdown: &CancellationToken) -> ReplayOutcome {
        self.bump(|s| s.processed += 1);

        let instruction = match RetryInstruction::from_json(&delivery.body) {
            Ok(i) => i,
            Err(err) => {
                warn!(error = %err, "malformed retry instruction, dropping");
                self.nack(&delivery, false).await;
                self.bump(|s| s.dropped += 1);
                return ReplayOutcome::Dropped;
            }
        };

        if !instruction.is_reorder() {
            warn!(
                action = %instruction.action_name,
                playlist_id = %instruction.playlist_id,
                "action is not replayable, acknowledging"
            );
            self.ack(&delivery).await;
            self.bump(|s| s.skipped += 1);
            return ReplayOutcome::Skipped;
        }

        if !self.wait_until_due(&instruction, shutdown).await {
            self.nack(&delivery, true).await;
            return ReplayOutcome::Interrupted;
        }

        let criterion = instruction.criterion().unwrap_or_default();
        let result = self
            .replayer
            .replay_reorder(&instruction.playlist_id, criterion, &instruction.user_id)
            .await;

        match result {
            Ok(report) => {
                info!(
                    playlist_id = %instruction.playlist_id,
                    new_playlist_id = %report.playlist_id,
                    criterion,
                    "replayed reorder"
                );
                self.ack(&delivery).await;
                self.bump(|s| s.replayed += 1);
                ReplayOutcome::Replayed
            }
            Err(ReorderError::QuotaExceeded { retry_at }) => {
                info!(playlist_id = %instruction.playlist_id, %retry_at, "quota still exhausted, successor queued");
                self.ack(&delivery).await;
                self.bump(|s| s.deferred += 1);
                ReplayOutcome::Deferred
            }
            Err(err) => {
                warn!(playlist_id = %instruction.playlist_id, error = %err, "replay failed, requeueing");
                self.nack(&delivery, true).await;
                self.bump(|s| s.requeued += 1);
                ReplayOutcome::Requeued
            }
        }
    }

    /// Sleep until `retry_at` when scheduling is honored. `false` if shut down first.
    async fn wait_until_due(&self, instruction: &RetryInstruction, shutdown: &CancellationToken) -> bool {
        if !self.config.honor_schedule {
            return true;
        }
        let Some(due) = instruction.retry_at_time() else {
            return true;
        };
        let Ok(wait) = (due - (self.clock)()).to_std() else {
            return true;
        };
        if wait.is_zero() {
            return true;
        }

        info!(playlist_id = %instruction.playlist_id, retry_at = %due, "waiting for scheduled retry time");
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }

    /// Back off for `poll_interval`. `true` if shut down meanwhile.
    async fn pause(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => true,
            _ = tokio::time::sleep(self.config.poll_interval) => false,
        }
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(err) = self.queue.ack(delivery).await {
            error!(message_id = %delivery.tag, error = %err, "ack failed");
        }
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) {
        if let Err(err) = self.queue.nack(delivery, requeue).await {
            error!(message_id = %delivery.tag, requeue, error = %err, "nack failed");
        }
    }

    fn bump(&self, f: impl FnOnce(&mut ConsumerStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}
