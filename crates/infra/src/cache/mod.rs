//! Write-through playlist snapshot cache.
//!
//! Snapshots are stored per user (`playlists:{userId}` → playlist id → JSON)
//! with a global reverse index (`playlistIndex`: playlist id → user id) so a
//! playlist can be resolved or evicted from its id alone.
//!
//! Entries never expire. They are created by the list-all path or a finished
//! reorder, overwritten by later reorders, and removed on explicit delete.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod snapshot;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use playsort_core::{Playlist, PlaylistId, UserId};

pub use in_memory::InMemorySnapshotCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisSnapshotCache;
pub use snapshot::{PlaylistSnapshot, VideoSnapshot};

/// Hash holding the playlist id → user id reverse index.
pub const INDEX_KEY: &str = "playlistIndex";

/// Hash holding one user's snapshots.
pub const USER_KEY_PREFIX: &str = "playlists:";

pub fn user_key(user_id: &UserId) -> String {
    format!("{USER_KEY_PREFIX}{user_id}")
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("playlist not cached: {0}")]
    NotFound(PlaylistId),

    #[error("snapshot serialization error: {0}")]
    Serialization(String),

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache state poisoned")]
    Poisoned,
}

/// Snapshot storage keyed by `(user, playlist)`.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Write the forward entry and the reverse index for `playlist`.
    async fn set(&self, user_id: &UserId, playlist: &Playlist) -> Result<(), CacheError>;

    /// Write every playlist for `user_id`. Stops at the first failure.
    async fn set_all(&self, user_id: &UserId, playlists: &[Playlist]) -> Result<(), CacheError> {
        for playlist in playlists {
            self.set(user_id, playlist).await?;
        }
        Ok(())
    }

    /// All decodable snapshots for a user. Corrupt or blank entries are skipped.
    async fn get_all(&self, user_id: &UserId) -> Result<Vec<Playlist>, CacheError>;

    /// Resolve the owner through the reverse index, then read the snapshot.
    async fn get_by_id(&self, playlist_id: &PlaylistId) -> Result<Playlist, CacheError>;

    /// Remove both the forward entry and the reverse index entry.
    async fn delete(&self, playlist_id: &PlaylistId) -> Result<(), CacheError>;
}

#[async_trait]
impl<C> SnapshotCache for Arc<C>
where
    C: SnapshotCache + ?Sized,
{
    async fn set(&self, user_id: &UserId, playlist: &Playlist) -> Result<(), CacheError> {
        (**self).set(user_id, playlist).await
    }

    async fn set_all(&self, user_id: &UserId, playlists: &[Playlist]) -> Result<(), CacheError> {
        (**self).set_all(user_id, playlists).await
    }

    async fn get_all(&self, user_id: &UserId) -> Result<Vec<Playlist>, CacheError> {
        (**self).get_all(user_id).await
    }

    async fn get_by_id(&self, playlist_id: &PlaylistId) -> Result<Playlist, CacheError> {
        (**self).get_by_id(playlist_id).await
    }

    async fn delete(&self, playlist_id: &PlaylistId) -> Result<(), CacheError> {
        (**self).delete(playlist_id).await
    }
}

pub(crate) fn encode(playlist: &Playlist) -> Result<String, CacheError> {
    serde_json::to_string(&PlaylistSnapshot::from(playlist))
        .map_err(|e| CacheError::Serialization(e.to_string()))
}

pub(crate) fn decode(raw: &str) -> Result<Playlist, CacheError> {
    serde_json::from_str::<PlaylistSnapshot>(raw)
        .map(PlaylistSnapshot::into_playlist)
        .map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Decode a user's raw entries for bulk listing.
///
/// Undecodable entries and entries whose id or title is blank are logged and
/// dropped; they never fail the listing.
pub(crate) fn decode_listing<'a, I>(user_id: &UserId, entries: I) -> Vec<Playlist>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut playlists = Vec::new();
    for (field, raw) in entries {
        let playlist = match decode(raw) {
            Ok(p) => p,
            Err(err) => {
                warn!(user_id = %user_id, playlist_id = field, error = %err, "dropping corrupt snapshot");
                continue;
            }
        };
        if playlist.id().is_blank() || playlist.title().trim().is_empty() {
            warn!(user_id = %user_id, playlist_id = field, "dropping snapshot with blank id or title");
            continue;
        }
        playlists.push(playlist);
    }
    playlists
}
