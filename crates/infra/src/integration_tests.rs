//! Integration tests for the reorder and deferred-retry pipeline.
//!
//! Tests: PlaylistService → Gateway → SnapshotCache, and
//! ErrorClassifier → MessageQueue → RetryConsumer → PlaylistService
//!
//! Verifies:
//! - A reorder always fetches live data and overwrites the cached snapshot
//! - A quota refusal is queued, replayed by the consumer and then cached
//! - Failed replays are redelivered, malformed messages never reach the service

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use playsort_core::{Playlist, PlaylistId, UserId, Video, VideoId};
    use playsort_events::{InMemoryMessageQueue, MessageQueue, RetryInstruction};

    use crate::cache::{InMemorySnapshotCache, SnapshotCache};
    use crate::classifier::ErrorClassifier;
    use crate::credentials::{AccessToken, InMemoryCredentialStore};
    use crate::gateway::{GatewayError, GatewayOp, InMemoryGateway};
    use crate::orchestrator::{PlaylistService, ReorderError};
    use crate::workers::{ReplayOutcome, RetryConsumer, RetryConsumerConfig};

    type Service = PlaylistService<
        Arc<InMemoryGateway>,
        Arc<InMemorySnapshotCache>,
        Arc<InMemoryCredentialStore>,
        Arc<InMemoryMessageQueue>,
    >;

    struct Pipeline {
        service: Arc<Service>,
        gateway: Arc<InMemoryGateway>,
        cache: Arc<InMemorySnapshotCache>,
        queue: Arc<InMemoryMessageQueue>,
        consumer: RetryConsumer<Arc<InMemoryMessageQueue>, Arc<Service>>,
    }

    fn published(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn user() -> UserId {
        UserId::new("u1")
    }

    fn p1() -> Playlist {
        let videos = vec![
            Video::new(VideoId::new("videoA"), "B", "UC1", None, published(1), Duration::from_secs(200)),
            Video::new(VideoId::new("videoB"), "A", "UC1", None, published(2), Duration::from_secs(100)),
        ];
        Playlist::new(PlaylistId::new("p1"), "UC1", "Road trip", "", published(1), videos)
    }

    fn video_ids(p: &Playlist) -> Vec<&str> {
        p.videos().iter().map(|v| v.id().as_str()).collect()
    }

    fn setup() -> Pipeline {
        let gateway = Arc::new(InMemoryGateway::new().with_playlist(p1()));
        let cache = Arc::new(InMemorySnapshotCache::new());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        credentials.insert(user(), AccessToken::new("ya29.token"));
        let queue = Arc::new(InMemoryMessageQueue::new());

        let service = Arc::new(PlaylistService::new(
            gateway.clone(),
            cache.clone(),
            credentials,
            ErrorClassifier::new(queue.clone()),
        ));
        let config = RetryConsumerConfig::default()
            .with_honor_schedule(false)
            .with_receive_wait(Duration::from_millis(10))
            .with_poll_interval(Duration::from_millis(10));
        let consumer = RetryConsumer::new(queue.clone(), service.clone(), config);

        Pipeline {
            service,
            gateway,
            cache,
            queue,
            consumer,
        }
    }

    async fn next_delivery(queue: &InMemoryMessageQueue) -> playsort_events::Delivery {
        queue
            .receive(Duration::ZERO)
            .await
            .unwrap()
            .expect("a queued delivery")
    }

    #[tokio::test]
    async fn reorder_bypasses_cache_and_overwrites_snapshot() {
        let p = setup();
        p.cache.set(&user(), &p1()).await.unwrap();

        let report = p.service.reorder(&PlaylistId::new("p1"), "byTitle", &user()).await.unwrap();

        // Live fetch, not the cache.
        assert_eq!(p.gateway.calls(GatewayOp::GetPlaylist), 1);

        let created = p.gateway.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].id, report.playlist_id);
        assert_eq!(created[0].videos, vec![VideoId::new("videoB"), VideoId::new("videoA")]);

        let all = p.cache.get_all(&user()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id(), &PlaylistId::new("p1"));
        assert_eq!(video_ids(&all[0]), vec!["videoB", "videoA"]);
    }

    #[tokio::test]
    async fn quota_refusal_is_replayed_by_consumer_and_cached() {
        let p = setup();
        p.cache.set(&user(), &p1()).await.unwrap();
        p.gateway.fail_next(
            GatewayOp::CreatePlaylist,
            GatewayError::Quota { reason: "quotaExceeded".into() },
        );

        let err = p.service.reorder(&PlaylistId::new("p1"), "byTitle", &user()).await.unwrap_err();
        assert!(matches!(err, ReorderError::QuotaExceeded { .. }));
        assert_eq!(p.queue.ready_len(), 1);
        // Nothing published, so the cache keeps the old order.
        let before = p.cache.get_by_id(&PlaylistId::new("p1")).await.unwrap();
        assert_eq!(video_ids(&before), vec!["videoA", "videoB"]);

        let instruction = RetryInstruction::from_json(&p.queue.ready_bodies()[0]).unwrap();
        assert_eq!(instruction.action_name, "reorder_playlist");
        assert_eq!(instruction.criterion(), Some("byTitle"));

        let delivery = next_delivery(&p.queue).await;
        let outcome = p.consumer.handle(delivery, &CancellationToken::new()).await;

        assert_eq!(outcome, ReplayOutcome::Replayed);
        assert_eq!(p.queue.ready_len() + p.queue.in_flight_len(), 0);
        assert_eq!(p.gateway.created().len(), 1);
        let after = p.cache.get_by_id(&PlaylistId::new("p1")).await.unwrap();
        assert_eq!(video_ids(&after), vec!["videoB", "videoA"]);
    }

    #[tokio::test]
    async fn failed_replay_is_redelivered_then_succeeds() {
        let p = setup();
        let body = RetryInstruction::new(
            "reorder_byTitle",
            PlaylistId::new("p1"),
            "",
            user(),
            "quota exceeded",
            Utc::now(),
        )
        .to_json()
        .unwrap();
        p.queue.publish(body).await.unwrap();
        p.gateway.fail_next(GatewayOp::GetPlaylist, GatewayError::Transient("503".into()));

        let first = next_delivery(&p.queue).await;
        assert_eq!(p.consumer.handle(first, &CancellationToken::new()).await, ReplayOutcome::Requeued);
        assert!(p.gateway.created().is_empty());

        let second = next_delivery(&p.queue).await;
        assert_eq!(second.delivery_count, 2);
        assert_eq!(p.consumer.handle(second, &CancellationToken::new()).await, ReplayOutcome::Replayed);

        assert_eq!(p.gateway.created()[0].videos, vec![VideoId::new("videoB"), VideoId::new("videoA")]);
        assert_eq!(p.queue.ready_len() + p.queue.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn malformed_message_never_reaches_the_service() {
        let p = setup();
        p.queue.publish("not json at all".into()).await.unwrap();

        let delivery = next_delivery(&p.queue).await;
        assert_eq!(p.consumer.handle(delivery, &CancellationToken::new()).await, ReplayOutcome::Dropped);

        assert_eq!(p.gateway.total_calls(), 0);
        assert_eq!(p.queue.dropped(), 1);
        assert_eq!(p.queue.ready_len(), 0);
    }

    #[tokio::test]
    async fn spawned_consumer_replays_in_background() {
        let p = setup();
        p.gateway.fail_next(
            GatewayOp::GetPlaylist,
            GatewayError::Quota { reason: "rateLimitExceeded".into() },
        );
        assert!(p.service.reorder(&PlaylistId::new("p1"), "byTitle", &user()).await.is_err());

        let handle = p.consumer.spawn();
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.stats().replayed < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("retry was not replayed");
        handle.shutdown().await;

        let cached = p.cache.get_by_id(&PlaylistId::new("p1")).await.unwrap();
        assert_eq!(video_ids(&cached), vec!["videoB", "videoA"]);
    }
}
