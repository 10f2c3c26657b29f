//! YouTube Data API v3 client.
//!
//! ## Error Mapping
//!
//! | Response / failure | `GatewayError` |
//! |---|---|
//! | 403 with any `error.errors[].reason == "quotaExceeded"` | `Quota` |
//! | 404 | `NotFound` |
//! | 400 | `InvalidArgument` |
//! | 429, 5xx, connect error, timeout | `Transient` |
//! | anything else (401, other 403, undecodable body) | `Fatal` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::instrument;

use playsort_core::{PlaylistId, Video, VideoId, parse_iso8601_duration};

use super::{GatewayError, PlaylistGateway, PlaylistHeader};
use crate::credentials::AccessToken;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Page size used for every list call (the API maximum).
const PAGE_SIZE: &str = "50";

const QUOTA_REASON: &str = "quotaExceeded";

#[derive(Debug, Clone)]
pub struct YouTubeGatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for YouTubeGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct YouTubeGateway {
    client: Client,
    base_url: String,
}

impl YouTubeGateway {
    pub fn new(config: YouTubeGatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Fatal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{resource}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Fatal(format!("undecodable response: {e}")))
    }
}

/// Map a non-2xx response.
pub fn map_status(status: StatusCode, body: &str) -> GatewayError {
    let api_error = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error)
        .unwrap_or_default();
    let message = if api_error.message.is_empty() {
        status.to_string()
    } else {
        api_error.message.clone()
    };

    match status {
        StatusCode::FORBIDDEN if api_error.errors.iter().any(|e| e.reason == QUOTA_REASON) => {
            GatewayError::Quota { reason: message }
        }
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        StatusCode::BAD_REQUEST => GatewayError::InvalidArgument(message),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::Transient(format!("{status}: {message}")),
        s if s.is_server_error() => GatewayError::Transient(format!("{status}: {message}")),
        _ => GatewayError::Fatal(format!("{status}: {message}")),
    }
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() || err.is_connect() {
        GatewayError::Transient(err.to_string())
    } else {
        GatewayError::Fatal(err.to_string())
    }
}

#[async_trait]
impl PlaylistGateway for YouTubeGateway {
    #[instrument(skip(self, token), err)]
    async fn list_playlists(&self, token: &AccessToken) -> Result<Vec<PlaylistHeader>, GatewayError> {
        let mut headers = Vec::new();
        let mut page_token = String::new();
        loop {
            let mut query = vec![
                ("part", "snippet,contentDetails"),
                ("mine", "true"),
                ("maxResults", PAGE_SIZE),
            ];
            if !page_token.is_empty() {
                query.push(("pageToken", page_token.as_str()));
            }
            let page: ListResponse<PlaylistResource> = self
                .send_json(self.client.get(self.url("playlists")).bearer_auth(token.expose()).query(&query))
                .await?;

            headers.extend(page.items.into_iter().map(PlaylistResource::into_header));
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = next,
                _ => break,
            }
        }
        Ok(headers)
    }

    #[instrument(skip(self, token), fields(playlist_id = %playlist_id), err)]
    async fn get_playlist(&self, token: &AccessToken, playlist_id: &PlaylistId) -> Result<PlaylistHeader, GatewayError> {
        let page: ListResponse<PlaylistResource> = self
            .send_json(
                self.client
                    .get(self.url("playlists"))
                    .bearer_auth(token.expose())
                    .query(&[("part", "snippet,status,contentDetails"), ("id", playlist_id.as_str())]),
            )
            .await?;
        page.items
            .into_iter()
            .next()
            .map(PlaylistResource::into_header)
            .ok_or_else(|| GatewayError::NotFound(format!("playlist {playlist_id}")))
    }

    #[instrument(skip(self, token), fields(playlist_id = %playlist_id), err)]
    async fn list_playlist_video_ids(
        &self,
        token: &AccessToken,
        playlist_id: &PlaylistId,
    ) -> Result<Vec<VideoId>, GatewayError> {
        let mut ids = Vec::new();
        let mut page_token = String::new();
        loop {
            let page: ListResponse<PlaylistItemResource> = self
                .send_json(
                    self.client
                        .get(self.url("playlistItems"))
                        .bearer_auth(token.expose())
                        .query(&[
                            ("part", "contentDetails"),
                            ("playlistId", playlist_id.as_str()),
                            ("maxResults", PAGE_SIZE),
                            ("pageToken", page_token.as_str()),
                        ]),
                )
                .await?;

            ids.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.content_details)
                    .filter_map(|details| details.video_id)
                    .filter(|id| !id.is_empty())
                    .map(VideoId::new),
            );
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = next,
                _ => break,
            }
        }
        Ok(ids)
    }

    #[instrument(skip(self, token), fields(video_id = %video_id), err)]
    async fn get_video(&self, token: &AccessToken, video_id: &VideoId) -> Result<Video, GatewayError> {
        let page: ListResponse<VideoResource> = self
            .send_json(
                self.client
                    .get(self.url("videos"))
                    .bearer_auth(token.expose())
                    .query(&[("part", "snippet,contentDetails"), ("id", video_id.as_str())]),
            )
            .await?;
        let resource = page
            .items
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(format!("video {video_id}")))?;
        resource.into_video()
    }

    #[instrument(skip(self, token, description), err)]
    async fn create_playlist(
        &self,
        token: &AccessToken,
        title: &str,
        description: &str,
    ) -> Result<PlaylistId, GatewayError> {
        let body = json!({
            "snippet": { "title": title, "description": description },
            "status": { "privacyStatus": "public" },
        });
        let created: CreatedResource = self
            .send_json(
                self.client
                    .post(self.url("playlists"))
                    .bearer_auth(token.expose())
                    .query(&[("part", "snippet,status")])
                    .json(&body),
            )
            .await?;
        Ok(PlaylistId::new(created.id))
    }

    #[instrument(skip(self, token), fields(playlist_id = %playlist_id, video_id = %video_id), err)]
    async fn add_video(
        &self,
        token: &AccessToken,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "snippet": {
                "playlistId": playlist_id.as_str(),
                "resourceId": { "kind": "youtube#video", "videoId": video_id.as_str() },
            },
        });
        self.send(
            self.client
                .post(self.url("playlistItems"))
                .bearer_auth(token.expose())
                .query(&[("part", "snippet")])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(playlist_id = %playlist_id), err)]
    async fn delete_playlist(&self, token: &AccessToken, playlist_id: &PlaylistId) -> Result<(), GatewayError> {
        self.send(
            self.client
                .delete(self.url("playlists"))
                .bearer_auth(token.expose())
                .query(&[("id", playlist_id.as_str())]),
        )
        .await?;
        Ok(())
    }
}

// --- wire types -------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    published_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResource {
    id: String,
    snippet: PlaylistSnippet,
}

impl PlaylistResource {
    fn into_header(self) -> PlaylistHeader {
        PlaylistHeader {
            id: PlaylistId::new(self.id),
            channel_id: self.snippet.channel_id,
            title: self.snippet.title,
            description: self.snippet.description,
            published_at: self.snippet.published_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemResource {
    #[serde(default)]
    content_details: Option<ItemContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemContentDetails {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_id: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    default_audio_language: Option<String>,
    #[serde(default)]
    default_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    duration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    id: String,
    snippet: VideoSnippet,
    content_details: VideoContentDetails,
}

impl VideoResource {
    fn into_video(self) -> Result<Video, GatewayError> {
        let duration = parse_iso8601_duration(&self.content_details.duration)
            .map_err(|e| GatewayError::Fatal(format!("video {}: {e}", self.id)))?;
        let language = self.snippet.default_audio_language.or(self.snippet.default_language);
        Ok(Video::new(
            VideoId::new(self.id),
            self.snippet.title,
            self.snippet.channel_id,
            language,
            self.snippet.published_at,
            duration,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}
