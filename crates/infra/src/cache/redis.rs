//! Redis-backed snapshot cache.
//!
//! ## Layout
//!
//! - `playlists:{userId}`: hash, field = playlist id, value = snapshot JSON
//! - `playlistIndex`: hash, field = playlist id, value = owning user id
//!
//! Deletes touch both hashes inside one `MULTI/EXEC` so the reverse index never
//! points at a missing forward entry (or the other way round). Writes run as a
//! single Lua script because they first read the current owner: a playlist
//! cached by another user is moved, not duplicated.

use std::collections::HashMap;

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use tracing::instrument;

use playsort_core::{Playlist, PlaylistId, UserId};

use super::{CacheError, INDEX_KEY, SnapshotCache, USER_KEY_PREFIX, decode, decode_listing, encode, user_key};

/// KEYS: forward hash, index hash. ARGV: playlist id, snapshot, user id, forward key prefix.
const SET_SCRIPT: &str = r#"
local previous = redis.call('HGET', KEYS[2], ARGV[1])
if previous and previous ~= ARGV[3] then
  redis.call('HDEL', ARGV[4] .. previous, ARGV[1])
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('HSET', KEYS[2], ARGV[1], ARGV[3])
return 1
"#;

#[derive(Clone)]
pub struct RedisSnapshotCache {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisSnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSnapshotCache").finish_non_exhaustive()
    }
}

impl RedisSnapshotCache {
    /// Open a multiplexed connection to `redis_url` (e.g. `redis://localhost:6379`).
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(redis_url.as_ref()).map_err(backend)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(backend)?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    async fn owner_of(&self, playlist_id: &PlaylistId) -> Result<UserId, CacheError> {
        let mut conn = self.conn.clone();
        let owner: Option<String> = conn
            .hget(INDEX_KEY, playlist_id.as_str())
            .await
            .map_err(backend)?;
        owner
            .filter(|o| !o.trim().is_empty())
            .map(UserId::new)
            .ok_or_else(|| CacheError::NotFound(playlist_id.clone()))
    }
}

fn backend(err: ::redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    #[instrument(skip(self, playlist), fields(user_id = %user_id, playlist_id = %playlist.id()), err)]
    async fn set(&self, user_id: &UserId, playlist: &Playlist) -> Result<(), CacheError> {
        let raw = encode(playlist)?;
        let mut conn = self.conn.clone();
        ::redis::Script::new(SET_SCRIPT)
            .key(user_key(user_id))
            .key(INDEX_KEY)
            .arg(playlist.id().as_str())
            .arg(raw)
            .arg(user_id.as_str())
            .arg(USER_KEY_PREFIX)
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map(|_| ())
            .map_err(backend)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn get_all(&self, user_id: &UserId) -> Result<Vec<Playlist>, CacheError> {
        let mut conn = self.conn.clone();
        let entries: HashMap<String, String> =
            conn.hgetall(user_key(user_id)).await.map_err(backend)?;
        Ok(decode_listing(
            user_id,
            entries.iter().map(|(id, raw)| (id.as_str(), raw.as_str())),
        ))
    }

    #[instrument(skip(self), fields(playlist_id = %playlist_id), err)]
    async fn get_by_id(&self, playlist_id: &PlaylistId) -> Result<Playlist, CacheError> {
        let owner = self.owner_of(playlist_id).await?;
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(user_key(&owner), playlist_id.as_str())
            .await
            .map_err(backend)?;
        let raw = raw.ok_or_else(|| CacheError::NotFound(playlist_id.clone()))?;
        decode(&raw)
    }

    #[instrument(skip(self), fields(playlist_id = %playlist_id), err)]
    async fn delete(&self, playlist_id: &PlaylistId) -> Result<(), CacheError> {
        let owner = self.owner_of(playlist_id).await?;
        let mut conn = self.conn.clone();
        ::redis::pipe()
            .atomic()
            .hdel(user_key(&owner), playlist_id.as_str())
            .ignore()
            .hdel(INDEX_KEY, playlist_id.as_str())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)
    }
}
