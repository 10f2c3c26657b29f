//! Cached JSON shape of a playlist.
//!
//! Field names are part of the stored format: the playlist level is camelCase,
//! the video level uses `artist` for the owning channel and `published_at`,
//! and `duration` is an integer count of nanoseconds.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use playsort_core::{Playlist, PlaylistId, Video, VideoId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSnapshot {
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub videos: Vec<VideoSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSnapshot {
    pub id: String,
    pub title: String,
    /// Owning channel id.
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub language: Option<String>,
    pub published_at: DateTime<Utc>,
    /// Nanoseconds.
    #[serde(default)]
    pub duration: u64,
}

impl PlaylistSnapshot {
    pub fn into_playlist(self) -> Playlist {
        let videos = self.videos.into_iter().map(VideoSnapshot::into_video).collect();
        Playlist::new(
            PlaylistId::new(self.id),
            self.channel_id,
            self.title,
            self.description,
            self.published_at,
            videos,
        )
    }
}

impl From<&Playlist> for PlaylistSnapshot {
    fn from(playlist: &Playlist) -> Self {
        Self {
            id: playlist.id().to_string(),
            channel_id: playlist.channel_id().to_string(),
            title: playlist.title().to_string(),
            description: playlist.description().to_string(),
            published_at: playlist.published_at(),
            videos: playlist.videos().iter().map(VideoSnapshot::from).collect(),
        }
    }
}

impl VideoSnapshot {
    pub fn into_video(self) -> Video {
        Video::new(
            VideoId::new(self.id),
            self.title,
            self.artist,
            self.language,
            self.published_at,
            Duration::from_nanos(self.duration),
        )
    }
}

impl From<&Video> for VideoSnapshot {
    fn from(video: &Video) -> Self {
        Self {
            id: video.id().to_string(),
            title: video.title().to_string(),
            artist: video.channel_id().to_string(),
            language: video.language().map(str::to_string),
            published_at: video.published_at(),
            duration: u64::try_from(video.duration().as_nanos()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Playlist {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Playlist::new(
            PlaylistId::new("PL1"),
            "UC1",
            "Mix",
            "desc",
            at,
            vec![Video::new(
                VideoId::new("v1"),
                "Song",
                "UCartist",
                Some("en".into()),
                at,
                Duration::from_secs(90),
            )],
        )
    }

    #[test]
    fn uses_the_stored_field_names() {
        let json = serde_json::to_value(PlaylistSnapshot::from(&sample())).unwrap();
        assert_eq!(json["channelId"], "UC1");
        assert_eq!(json["publishedAt"], "2024-03-01T12:00:00Z");
        let video = &json["videos"][0];
        assert_eq!(video["artist"], "UCartist");
        assert_eq!(video["published_at"], "2024-03-01T12:00:00Z");
        assert_eq!(video["duration"], 90_000_000_000u64);
    }

    #[test]
    fn reads_entries_without_optional_fields() {
        let raw = r#"{"id":"PL9","title":"Old","publishedAt":"2023-01-01T00:00:00Z",
                      "videos":[{"id":"v","title":"t","published_at":"2023-01-01T00:00:00Z","duration":1000}]}"#;
        let playlist = serde_json::from_str::<PlaylistSnapshot>(raw).unwrap().into_playlist();
        assert_eq!(playlist.id().as_str(), "PL9");
        assert_eq!(playlist.description(), "");
        assert_eq!(playlist.videos()[0].language(), None);
        assert_eq!(playlist.videos()[0].duration(), Duration::from_micros(1));
    }

    #[test]
    fn converts_back_to_an_equal_playlist() {
        let original = sample();
        let back = PlaylistSnapshot::from(&original).into_playlist();
        assert_eq!(back, original);
    }
}
