//! Playlist record and its sort orders.

use chrono::{DateTime, Utc};

use crate::criterion::SortCriterion;
use crate::id::PlaylistId;
use crate::video::Video;

/// A playlist and its ordered videos.
///
/// The video order is the only thing that changes, and it only changes by
/// consuming the playlist through one of the `sort_*` methods, which hand back
/// a new value. A request that wants to reorder must own its copy; there is no
/// way to reorder through a shared reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    id: PlaylistId,
    channel_id: String,
    title: String,
    description: String,
    published_at: DateTime<Utc>,
    videos: Vec<Video>,
}

impl Playlist {
    pub fn new(
        id: PlaylistId,
        channel_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        published_at: DateTime<Utc>,
        videos: Vec<Video>,
    ) -> Self {
        Self {
            id,
            channel_id: channel_id.into(),
            title: title.into(),
            description: description.into(),
            published_at,
            videos,
        }
    }

    pub fn id(&self) -> &PlaylistId {
        &self.id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn into_videos(self) -> Vec<Video> {
        self.videos
    }

    /// Reorder by the given criterion.
    pub fn sorted(self, criterion: SortCriterion) -> Self {
        match criterion {
            SortCriterion::ByTitle => self.sort_by_title(),
            SortCriterion::ByPublishedAt => self.sort_by_published_at(),
            SortCriterion::ByDuration => self.sort_by_duration(),
            SortCriterion::ByLength => self.sort_by_length(),
        }
    }

    /// Ascending ordinal (byte-wise) title order. Equal titles keep their relative order.
    pub fn sort_by_title(self) -> Self {
        self.with_order(|a, b| a.title().cmp(b.title()))
    }

    /// Ascending publish instant.
    pub fn sort_by_published_at(self) -> Self {
        self.with_order(|a, b| a.published_at().cmp(&b.published_at()))
    }

    /// Newest publish instant first.
    ///
    /// This is what "by duration" has always meant for existing clients; see
    /// `sort_by_length` for ordering by running time.
    pub fn sort_by_duration(self) -> Self {
        self.with_order(|a, b| b.published_at().cmp(&a.published_at()))
    }

    /// Ascending running time.
    pub fn sort_by_length(self) -> Self {
        self.with_order(|a, b| a.duration().cmp(&b.duration()))
    }

    fn with_order(self, cmp: impl FnMut(&Video, &Video) -> core::cmp::Ordering) -> Self {
        let mut videos = self.videos;
        // `sort_by` is stable.
        videos.sort_by(cmp);
        Self { videos, ..self }
    }
}
