use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::id::VideoId;

/// A single video as known to the remote platform.
///
/// Immutable once constructed; accessors only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Video {
    id: VideoId,
    title: String,
    channel_id: String,
    language: Option<String>,
    published_at: DateTime<Utc>,
    duration: Duration,
}

impl Video {
    pub fn new(
        id: VideoId,
        title: impl Into<String>,
        channel_id: impl Into<String>,
        language: Option<String>,
        published_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            channel_id: channel_id.into(),
            language,
            published_at,
            duration,
        }
    }

    pub fn id(&self) -> &VideoId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
