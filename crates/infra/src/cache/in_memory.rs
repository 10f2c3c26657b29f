use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use playsort_core::{Playlist, PlaylistId, UserId};

use super::{CacheError, SnapshotCache, decode, decode_listing, encode};

#[derive(Debug, Default)]
struct State {
    forward: HashMap<UserId, BTreeMap<PlaylistId, String>>,
    index: HashMap<PlaylistId, UserId>,
}

/// In-memory snapshot cache for tests/dev.
///
/// Holds serialized snapshots, like the Redis backend, so corrupt-entry
/// handling behaves the same. Forward and index writes happen under one lock.
#[derive(Debug, Default)]
pub struct InMemorySnapshotCache {
    inner: RwLock<State>,
}

impl State {
    /// Write the forward entry and index; a previous owner's entry is evicted.
    fn put(&mut self, user_id: &UserId, playlist_id: &PlaylistId, raw: String) {
        if let Some(previous) = self.index.insert(playlist_id.clone(), user_id.clone()) {
            if &previous != user_id {
                self.remove_forward(&previous, playlist_id);
            }
        }
        self.forward
            .entry(user_id.clone())
            .or_default()
            .insert(playlist_id.clone(), raw);
    }

    fn remove_forward(&mut self, owner: &UserId, playlist_id: &PlaylistId) {
        if let Some(entries) = self.forward.get_mut(owner) {
            entries.remove(playlist_id);
            if entries.is_empty() {
                self.forward.remove(owner);
            }
        }
    }
}

impl InMemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw (possibly malformed) entry as-is.
    pub fn insert_raw(&self, user_id: &UserId, playlist_id: &PlaylistId, raw: impl Into<String>) {
        if let Ok(mut state) = self.inner.write() {
            state.put(user_id, playlist_id, raw.into());
        }
    }

    /// Reverse index lookup.
    pub fn owner_of(&self, playlist_id: &PlaylistId) -> Option<UserId> {
        self.inner.read().ok()?.index.get(playlist_id).cloned()
    }

    /// Raw forward entry.
    pub fn raw_entry(&self, user_id: &UserId, playlist_id: &PlaylistId) -> Option<String> {
        self.inner
            .read()
            .ok()?
            .forward
            .get(user_id)?
            .get(playlist_id)
            .cloned()
    }
}

#[async_trait]
impl SnapshotCache for InMemorySnapshotCache {
    async fn set(&self, user_id: &UserId, playlist: &Playlist) -> Result<(), CacheError> {
        let raw = encode(playlist)?;
        let mut state = self.inner.write().map_err(|_| CacheError::Poisoned)?;
        state.put(user_id, playlist.id(), raw);
        Ok(())
    }

    async fn get_all(&self, user_id: &UserId) -> Result<Vec<Playlist>, CacheError> {
        let state = self.inner.read().map_err(|_| CacheError::Poisoned)?;
        let Some(entries) = state.forward.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(decode_listing(
            user_id,
            entries.iter().map(|(id, raw)| (id.as_str(), raw.as_str())),
        ))
    }

    async fn get_by_id(&self, playlist_id: &PlaylistId) -> Result<Playlist, CacheError> {
        let state = self.inner.read().map_err(|_| CacheError::Poisoned)?;
        let raw = state
            .index
            .get(playlist_id)
            .and_then(|owner| state.forward.get(owner))
            .and_then(|entries| entries.get(playlist_id))
            .ok_or_else(|| CacheError::NotFound(playlist_id.clone()))?;
        decode(raw)
    }

    async fn delete(&self, playlist_id: &PlaylistId) -> Result<(), CacheError> {
        let mut state = self.inner.write().map_err(|_| CacheError::Poisoned)?;
        let owner = state
            .index
            .remove(playlist_id)
            .ok_or_else(|| CacheError::NotFound(playlist_id.clone()))?;
        state.remove_forward(&owner, playlist_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use playsort_core::{Video, VideoId};

    use super::*;

    fn playlist(id: &str, title: &str) -> Playlist {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Playlist::new(
            PlaylistId::new(id),
            "UC1",
            title,
            "",
            at,
            vec![Video::new(VideoId::new("v1"), "a", "UC1", None, at, Duration::from_secs(5))],
        )
    }

    #[tokio::test]
    async fn set_then_read_back_by_user_and_id() {
        let cache = InMemorySnapshotCache::new();
        let user = UserId::new("u1");
        let p = playlist("PL1", "Mix");

        cache.set(&user, &p).await.unwrap();

        assert_eq!(cache.get_all(&user).await.unwrap(), vec![p.clone()]);
        assert_eq!(cache.get_by_id(p.id()).await.unwrap(), p);
        assert_eq!(cache.owner_of(p.id()), Some(user));
    }

    #[tokio::test]
    async fn set_overwrites_previous_snapshot() {
        let cache = InMemorySnapshotCache::new();
        let user = UserId::new("u1");
        cache.set(&user, &playlist("PL1", "first")).await.unwrap();
        cache.set(&user, &playlist("PL1", "second")).await.unwrap();

        let all = cache.get_all(&user).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title(), "second");
    }

    #[tokio::test]
    async fn delete_removes_forward_entry_and_index() {
        let cache = InMemorySnapshotCache::new();
        let user = UserId::new("u1");
        let p = playlist("PL1", "Mix");
        cache.set(&user, &p).await.unwrap();

        cache.delete(p.id()).await.unwrap();

        assert!(cache.get_all(&user).await.unwrap().is_empty());
        assert_eq!(cache.owner_of(p.id()), None);
        assert_eq!(cache.raw_entry(&user, p.id()), None);
        assert_eq!(
            cache.get_by_id(p.id()).await,
            Err(CacheError::NotFound(p.id().clone()))
        );
    }

    #[tokio::test]
    async fn delete_of_unindexed_playlist_is_not_found() {
        let cache = InMemorySnapshotCache::new();
        let missing = PlaylistId::new("nope");
        assert_eq!(cache.delete(&missing).await, Err(CacheError::NotFound(missing.clone())));
    }

    #[tokio::test]
    async fn get_all_skips_corrupt_and_blank_entries() {
        let cache = InMemorySnapshotCache::new();
        let user = UserId::new("u1");
        cache.set(&user, &playlist("PL1", "good")).await.unwrap();
        cache.insert_raw(&user, &PlaylistId::new("PL2"), "{not json");
        cache.set(&user, &playlist("PL3", "   ")).await.unwrap();

        let all = cache.get_all(&user).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id().as_str(), "PL1");
    }

    #[tokio::test]
    async fn get_by_id_surfaces_corruption() {
        let cache = InMemorySnapshotCache::new();
        let id = PlaylistId::new("PL2");
        cache.insert_raw(&UserId::new("u1"), &id, "garbage");
        assert!(matches!(cache.get_by_id(&id).await, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn caching_under_a_new_owner_moves_the_snapshot() {
        let cache = InMemorySnapshotCache::new();
        let (u1, u2) = (UserId::new("u1"), UserId::new("u2"));
        let p = playlist("PL1", "Mix");

        cache.set(&u1, &p).await.unwrap();
        cache.set(&u2, &p).await.unwrap();

        assert!(cache.get_all(&u1).await.unwrap().is_empty());
        assert_eq!(cache.get_all(&u2).await.unwrap(), vec![p.clone()]);
        assert_eq!(cache.owner_of(p.id()), Some(u2.clone()));

        cache.delete(p.id()).await.unwrap();
        assert!(cache.get_all(&u1).await.unwrap().is_empty());
        assert!(cache.get_all(&u2).await.unwrap().is_empty());
        assert_eq!(cache.delete(p.id()).await, Err(CacheError::NotFound(p.id().clone())));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let cache = InMemorySnapshotCache::new();
        cache.set(&UserId::new("u1"), &playlist("PL1", "one")).await.unwrap();
        cache.set(&UserId::new("u2"), &playlist("PL2", "two")).await.unwrap();

        let u1 = cache.get_all(&UserId::new("u1")).await.unwrap();
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0].id().as_str(), "PL1");
    }
}
