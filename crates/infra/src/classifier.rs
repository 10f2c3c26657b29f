//! Gateway failure classification.
//!
//! The single place that decides what a remote failure means for the caller.
//! Quota exhaustion schedules a deferred retry on the queue; everything else
//! is translated into a [`ReorderError`] without side effects.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use playsort_core::{PlaylistId, UserId};
use playsort_events::{MessageQueue, RetryInstruction};

use crate::gateway::GatewayError;
use crate::orchestrator::ReorderError;

/// Default delay before a quota-refused action is replayed.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Source of "now" for computing `retry_at`.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What was being attempted when the remote call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    /// e.g. `reorder_playlist`, `delete_playlist`.
    pub action: String,
    pub playlist_id: PlaylistId,
    /// Replay parameters (the sort criterion for reorders).
    pub params: String,
    pub user_id: UserId,
}

impl RetryContext {
    pub fn new(
        action: impl Into<String>,
        playlist_id: PlaylistId,
        params: impl Into<String>,
        user_id: UserId,
    ) -> Self {
        Self {
            action: action.into(),
            playlist_id,
            params: params.into(),
            user_id,
        }
    }
}

pub struct ErrorClassifier<Q> {
    queue: Q,
    retry_delay: Duration,
    clock: Clock,
}

impl<Q> std::fmt::Debug for ErrorClassifier<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl<Q: MessageQueue> ErrorClassifier<Q> {
    pub fn new(queue: Q) -> Self {
        Self {
            queue,
            retry_delay: DEFAULT_RETRY_DELAY,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Classify `err`, scheduling a retry when it is a quota refusal.
    ///
    /// Exactly one instruction is published per quota error. If publishing
    /// fails the caller gets `RetryScheduling` rather than a silent loss.
    pub async fn classify(&self, err: GatewayError, ctx: RetryContext) -> ReorderError {
        match err {
            GatewayError::Quota { .. } => self.schedule_retry(&err, ctx).await,
            GatewayError::NotFound(what) => ReorderError::NotFound(what),
            GatewayError::InvalidArgument(msg) => ReorderError::InvalidArgument(msg),
            GatewayError::Transient(_) | GatewayError::Fatal(_) => {
                warn!(action = %ctx.action, playlist_id = %ctx.playlist_id, error = %err, "remote call failed");
                ReorderError::Unexpected(err.to_string())
            }
        }
    }

    async fn schedule_retry(&self, err: &GatewayError, ctx: RetryContext) -> ReorderError {
        let now = (self.clock)();
        // Delays past chrono's range fall back to a day.
        let retry_at = chrono::Duration::from_std(self.retry_delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or_else(|| now + chrono::Duration::days(1));
        let instruction = RetryInstruction::new(
            ctx.action.clone(),
            ctx.playlist_id.clone(),
            ctx.params,
            ctx.user_id,
            err.to_string(),
            retry_at,
        );

        let body = match instruction.to_json() {
            Ok(body) => body,
            Err(e) => return ReorderError::RetryScheduling(format!("encode retry instruction: {e}")),
        };
        if let Err(e) = self.queue.publish(body).await {
            warn!(action = %ctx.action, playlist_id = %ctx.playlist_id, error = %e, "failed to queue retry");
            return ReorderError::RetryScheduling(e.to_string());
        }

        info!(
            action = %ctx.action,
            playlist_id = %ctx.playlist_id,
            retry_at = %retry_at,
            "quota exceeded, retry queued"
        );
        ReorderError::QuotaExceeded { retry_at }
    }
}
