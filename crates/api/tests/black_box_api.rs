use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::json;

use playsort_api::app::services::{AppServices, Backends};
use playsort_core::{Playlist, PlaylistId, Video, VideoId};
use playsort_events::MessageQueue;
use playsort_infra::gateway::{GatewayError, GatewayOp, InMemoryGateway};
use playsort_infra::settings::Settings;

struct TestServer {
    base_url: String,
    gateway: Arc<InMemoryGateway>,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let gateway = Arc::new(InMemoryGateway::new().with_playlist(road_trip()));
        let settings = Settings::default();
        let services = Arc::new(AppServices::new(
            Backends::in_memory(gateway.clone(), settings.queue_capacity),
            &settings,
        ));

        // Same router as prod, bound to an ephemeral port.
        let app = playsort_api::app::build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            gateway,
            services,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn road_trip() -> Playlist {
    let at = |day| Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap();
    let videos = vec![
        Video::new(VideoId::new("vidA"), "Bravo", "UC1", None, at(1), Duration::from_secs(240)),
        Video::new(VideoId::new("vidB"), "Alpha", "UC1", Some("en".into()), at(2), Duration::from_secs(180)),
    ];
    Playlist::new(PlaylistId::new("p1"), "UC1", "Road trip", "summer", at(1), videos)
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;

    let res = client().get(srv.url("/health")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn user_header_required_for_playlist_endpoints() {
    let srv = TestServer::spawn().await;

    let res = client().get(srv.url("/playlists/all")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client()
        .get(srv.url("/playlists/validate"))
        .header("X-User-Id", "u1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let srv = TestServer::spawn().await;

    let res = client()
        .get(srv.url("/health"))
        .header("X-Request-Id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "abc-123");

    let res = client().get(srv.url("/health")).send().await.unwrap();
    assert!(!res.headers()["x-request-id"].is_empty());
}

#[tokio::test]
async fn reorder_then_list_returns_sorted_snapshot() {
    let srv = TestServer::spawn().await;

    let res = client()
        .post(srv.url("/playlists/reorder"))
        .header("X-User-Id", "u1")
        .bearer_auth("ya29.test")
        .json(&json!({ "playlist_id": "p1", "criteria": "byTitle" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["new_playlist_id"], "PLnew1");
    assert_eq!(body["videos_added"], 2);
    assert_eq!(body["videos_skipped"], 0);
    assert_eq!(
        srv.gateway.created()[0].videos,
        vec![VideoId::new("vidB"), VideoId::new("vidA")]
    );

    let res = client()
        .get(srv.url("/playlists/all"))
        .header("X-User-Id", "u1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let listed: serde_json::Value = res.json().await.unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], "p1");
    assert_eq!(listed[0]["channelId"], "UC1");
    let ids: Vec<_> = listed[0]["videos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["vidB", "vidA"]);
    assert_eq!(listed[0]["videos"][0]["duration"], 180_000_000_000u64);
}

#[tokio::test]
async fn reorder_validates_body() {
    let srv = TestServer::spawn().await;

    for body in [
        json!({ "criteria": "byTitle" }),
        json!({ "playlist_id": "p1" }),
        json!({ "playlist_id": " ", "criteria": "byTitle" }),
    ] {
        let res = client()
            .post(srv.url("/playlists/reorder"))
            .header("X-User-Id", "u1")
            .bearer_auth("ya29.test")
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }

    let res = client()
        .post(srv.url("/playlists/reorder"))
        .header("X-User-Id", "u1")
        .bearer_auth("ya29.test")
        .json(&json!({ "playlist_id": "p1", "criteria": "byMood" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(srv.gateway.total_calls(), 0);
}

#[tokio::test]
async fn quota_refusal_returns_503_and_queues_retry() {
    let srv = TestServer::spawn().await;
    srv.gateway.fail_next(
        GatewayOp::CreatePlaylist,
        GatewayError::Quota { reason: "quotaExceeded".into() },
    );

    let res = client()
        .post(srv.url("/playlists/reorder"))
        .header("X-User-Id", "u1")
        .bearer_auth("ya29.test")
        .json(&json!({ "playlist_id": "p1", "criteria": "byPublishedAt" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "quota_exceeded");
    assert!(body["retry_at"].as_str().is_some());

    let queued = srv.services.queue.receive(Duration::ZERO).await.unwrap().unwrap();
    let instruction: serde_json::Value = serde_json::from_str(&queued.body).unwrap();
    assert_eq!(instruction["action_name"], "reorder_playlist");
    assert_eq!(instruction["playlist_id"], "p1");
    assert_eq!(instruction["user_id"], "u1");
}

#[tokio::test]
async fn missing_access_token_is_an_internal_error() {
    let srv = TestServer::spawn().await;

    let res = client()
        .post(srv.url("/playlists/reorder"))
        .header("X-User-Id", "nobody")
        .json(&json!({ "playlist_id": "p1", "criteria": "byTitle" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn delete_removes_remote_playlist() {
    let srv = TestServer::spawn().await;

    let res = client()
        .delete(srv.url("/playlists/p1"))
        .header("X-User-Id", "u1")
        .bearer_auth("ya29.test")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(!srv.gateway.contains(&PlaylistId::new("p1")));

    let res = client()
        .delete(srv.url("/playlists/p1"))
        .header("X-User-Id", "u1")
        .bearer_auth("ya29.test")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
