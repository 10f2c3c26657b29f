//! Remote playlist platform boundary.
//!
//! Every remote failure is mapped exactly once, here, into a closed
//! [`GatewayError`]. Callers match on the variant and never inspect messages.
//!
//! Implementors provide the primitive calls; the composite operations
//! (`fetch_playlist`, `fetch_all_playlists`, `publish_reordered`) are default
//! methods built from them.

pub mod in_memory;
pub mod youtube;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use playsort_core::{Playlist, PlaylistId, Video, VideoId};

use crate::credentials::AccessToken;

pub use in_memory::{CreatedPlaylist, GatewayOp, InMemoryGateway};
pub use youtube::{YouTubeGateway, YouTubeGatewayConfig};

/// Marker inserted between the source title and the creation timestamp.
pub const REORDERED_TITLE_MARKER: &str = "reorder_playlist";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The platform refused the call because the caller's quota is spent.
    #[error("quota exceeded: {reason}")]
    Quota { reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Worth retrying soon (rate limiting, 5xx, network trouble).
    #[error("transient remote failure: {0}")]
    Transient(String),

    #[error("remote call failed: {0}")]
    Fatal(String),
}

impl GatewayError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Quota { .. })
    }
}

/// Playlist metadata without its videos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistHeader {
    pub id: PlaylistId,
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
}

impl PlaylistHeader {
    pub fn with_videos(self, videos: Vec<Video>) -> Playlist {
        Playlist::new(
            self.id,
            self.channel_id,
            self.title,
            self.description,
            self.published_at,
            videos,
        )
    }
}

impl From<&Playlist> for PlaylistHeader {
    fn from(p: &Playlist) -> Self {
        Self {
            id: p.id().clone(),
            channel_id: p.channel_id().to_string(),
            title: p.title().to_string(),
            description: p.description().to_string(),
            published_at: p.published_at(),
        }
    }
}

/// Outcome of materializing a reordered playlist remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Id of the newly created remote playlist.
    pub playlist_id: PlaylistId,
    pub added: usize,
    /// Videos whose insertion failed and were left out.
    pub skipped: usize,
}

/// Title given to the remote copy of a reordered playlist.
pub fn reordered_title(source_title: &str, now: DateTime<Utc>) -> String {
    format!(
        "{source_title} {REORDERED_TITLE_MARKER}_{}",
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

#[async_trait]
pub trait PlaylistGateway: Send + Sync {
    /// Every playlist owned by the token's user (all pages).
    async fn list_playlists(&self, token: &AccessToken) -> Result<Vec<PlaylistHeader>, GatewayError>;

    async fn get_playlist(
        &self,
        token: &AccessToken,
        playlist_id: &PlaylistId,
    ) -> Result<PlaylistHeader, GatewayError>;

    /// Video ids of a playlist in remote order (all pages).
    async fn list_playlist_video_ids(
        &self,
        token: &AccessToken,
        playlist_id: &PlaylistId,
    ) -> Result<Vec<VideoId>, GatewayError>;

    async fn get_video(&self, token: &AccessToken, video_id: &VideoId) -> Result<Video, GatewayError>;

    /// Create a public playlist and return its id.
    async fn create_playlist(
        &self,
        token: &AccessToken,
        title: &str,
        description: &str,
    ) -> Result<PlaylistId, GatewayError>;

    async fn add_video(
        &self,
        token: &AccessToken,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> Result<(), GatewayError>;

    async fn delete_playlist(&self, token: &AccessToken, playlist_id: &PlaylistId) -> Result<(), GatewayError>;

    /// Playlist header plus its videos.
    ///
    /// A video whose details cannot be fetched is logged and left out. A quota
    /// refusal on any video, or a failure listing the item ids, fails the
    /// whole call.
    async fn fetch_playlist(&self, token: &AccessToken, playlist_id: &PlaylistId) -> Result<Playlist, GatewayError> {
        let header = self.get_playlist(token, playlist_id).await?;
        let videos = self.fetch_videos(token, playlist_id).await?;
        Ok(header.with_videos(videos))
    }

    /// Every playlist of the user, each with its videos.
    async fn fetch_all_playlists(&self, token: &AccessToken) -> Result<Vec<Playlist>, GatewayError> {
        let headers = self.list_playlists(token).await?;
        let mut playlists = Vec::with_capacity(headers.len());
        for header in headers {
            let videos = self.fetch_videos(token, &header.id).await?;
            playlists.push(header.with_videos(videos));
        }
        Ok(playlists)
    }

    async fn fetch_videos(&self, token: &AccessToken, playlist_id: &PlaylistId) -> Result<Vec<Video>, GatewayError> {
        let ids = self.list_playlist_video_ids(token, playlist_id).await?;
        let mut videos = Vec::with_capacity(ids.len());
        for video_id in ids {
            match self.get_video(token, &video_id).await {
                Ok(video) => videos.push(video),
                Err(err) if err.is_quota() => return Err(err),
                Err(err) => {
                    warn!(playlist_id = %playlist_id, video_id = %video_id, error = %err, "skipping video");
                }
            }
        }
        Ok(videos)
    }

    /// Create a new remote playlist holding `playlist`'s videos in its current order.
    ///
    /// Creation failure is returned; individual insert failures are logged and
    /// counted in `skipped`.
    async fn publish_reordered(&self, token: &AccessToken, playlist: &Playlist) -> Result<PublishReport, GatewayError> {
        let title = reordered_title(playlist.title(), Utc::now());
        let new_id = self
            .create_playlist(token, &title, playlist.description())
            .await?;
        debug!(source = %playlist.id(), created = %new_id, "created reordered playlist");

        let mut report = PublishReport {
            playlist_id: new_id,
            added: 0,
            skipped: 0,
        };
        for video in playlist.videos() {
            match self.add_video(token, &report.playlist_id, video.id()).await {
                Ok(()) => report.added += 1,
                Err(err) => {
                    report.skipped += 1;
                    warn!(
                        playlist_id = %report.playlist_id,
                        video_id = %video.id(),
                        error = %err,
                        "failed to add video to reordered playlist"
                    );
                }
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl<G> PlaylistGateway for Arc<G>
where
    G: PlaylistGateway + ?Sized,
{
    async fn list_playlists(&self, token: &AccessToken) -> Result<Vec<PlaylistHeader>, GatewayError> {
        (**self).list_playlists(token).await
    }

    async fn get_playlist(&self, token: &AccessToken, playlist_id: &PlaylistId) -> Result<PlaylistHeader, GatewayError> {
        (**self).get_playlist(token, playlist_id).await
    }

    async fn list_playlist_video_ids(
        &self,
        token: &AccessToken,
        playlist_id: &PlaylistId,
    ) -> Result<Vec<VideoId>, GatewayError> {
        (**self).list_playlist_video_ids(token, playlist_id).await
    }

    async fn get_video(&self, token: &AccessToken, video_id: &VideoId) -> Result<Video, GatewayError> {
        (**self).get_video(token, video_id).await
    }

    async fn create_playlist(
        &self,
        token: &AccessToken,
        title: &str,
        description: &str,
    ) -> Result<PlaylistId, GatewayError> {
        (**self).create_playlist(token, title, description).await
    }

    async fn add_video(
        &self,
        token: &AccessToken,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> Result<(), GatewayError> {
        (**self).add_video(token, playlist_id, video_id).await
    }

    async fn delete_playlist(&self, token: &AccessToken, playlist_id: &PlaylistId) -> Result<(), GatewayError> {
        (**self).delete_playlist(token, playlist_id).await
    }

    async fn fetch_playlist(&self, token: &AccessToken, playlist_id: &PlaylistId) -> Result<Playlist, GatewayError> {
        (**self).fetch_playlist(token, playlist_id).await
    }

    async fn fetch_all_playlists(&self, token: &AccessToken) -> Result<Vec<Playlist>, GatewayError> {
        (**self).fetch_all_playlists(token).await
    }

    async fn fetch_videos(&self, token: &AccessToken, playlist_id: &PlaylistId) -> Result<Vec<Video>, GatewayError> {
        (**self).fetch_videos(token, playlist_id).await
    }

    async fn publish_reordered(&self, token: &AccessToken, playlist: &Playlist) -> Result<PublishReport, GatewayError> {
        (**self).publish_reordered(token, playlist).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn reordered_title_appends_marker_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(
            reordered_title("Road trip", now),
            "Road trip reorder_playlist_2024-05-06T07:08:09Z"
        );
    }

    #[test]
    fn only_quota_is_quota() {
        assert!(GatewayError::Quota { reason: "quotaExceeded".into() }.is_quota());
        assert!(!GatewayError::Transient("503".into()).is_quota());
    }
}
