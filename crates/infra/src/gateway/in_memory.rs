//! Scripted in-memory gateway for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use playsort_core::{Playlist, PlaylistId, Video, VideoId};

use super::{GatewayError, PlaylistGateway, PlaylistHeader};
use crate::credentials::AccessToken;

/// Primitive operations, used to script failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    ListPlaylists,
    GetPlaylist,
    ListVideoIds,
    GetVideo,
    CreatePlaylist,
    AddVideo,
    DeletePlaylist,
}

/// A playlist created through `create_playlist`, with the videos added to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPlaylist {
    pub id: PlaylistId,
    pub title: String,
    pub description: String,
    pub videos: Vec<VideoId>,
}

#[derive(Debug, Default)]
struct State {
    order: Vec<PlaylistId>,
    headers: HashMap<PlaylistId, PlaylistHeader>,
    items: HashMap<PlaylistId, Vec<VideoId>>,
    videos: HashMap<VideoId, Video>,
    created: Vec<CreatedPlaylist>,
    /// One-shot failures, consumed in order.
    fail_next: HashMap<GatewayOp, VecDeque<GatewayError>>,
    /// Failures returned on every call until cleared.
    fail_always: HashMap<GatewayOp, GatewayError>,
    broken_videos: HashMap<VideoId, GatewayError>,
    rejected_adds: HashMap<VideoId, GatewayError>,
    calls: HashMap<GatewayOp, usize>,
    next_id: u64,
}

/// Remote platform stand-in.
///
/// Seed it with playlists, script failures per operation, then inspect what
/// was created. Created playlists become listable like on the real platform.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a playlist and its videos.
    pub fn with_playlist(self, playlist: Playlist) -> Self {
        self.insert_playlist(playlist);
        self
    }

    pub fn insert_playlist(&self, playlist: Playlist) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let header = PlaylistHeader::from(&playlist);
        let id = header.id.clone();
        if !state.headers.contains_key(&id) {
            state.order.push(id.clone());
        }
        state.headers.insert(id.clone(), header);
        let videos = playlist.into_videos();
        state
            .items
            .insert(id, videos.iter().map(|v| v.id().clone()).collect());
        for video in videos {
            state.videos.insert(video.id().clone(), video);
        }
    }

    /// Fail the next call to `op` with `err`. Calls queue up.
    pub fn fail_next(&self, op: GatewayOp, err: GatewayError) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next.entry(op).or_default().push_back(err);
        }
    }

    /// Fail every call to `op` until [`clear_failures`](Self::clear_failures).
    pub fn fail_always(&self, op: GatewayOp, err: GatewayError) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_always.insert(op, err);
        }
    }

    /// `get_video` for this id fails with `err`.
    pub fn break_video(&self, video_id: VideoId, err: GatewayError) {
        if let Ok(mut state) = self.state.lock() {
            state.broken_videos.insert(video_id, err);
        }
    }

    /// `add_video` of this id fails with `err`.
    pub fn reject_add(&self, video_id: VideoId, err: GatewayError) {
        if let Ok(mut state) = self.state.lock() {
            state.rejected_adds.insert(video_id, err);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next.clear();
            state.fail_always.clear();
            state.broken_videos.clear();
            state.rejected_adds.clear();
        }
    }

    pub fn created(&self) -> Vec<CreatedPlaylist> {
        self.state
            .lock()
            .map(|s| s.created.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self, op: GatewayOp) -> usize {
        self.state
            .lock()
            .map(|s| s.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total number of primitive calls made.
    pub fn total_calls(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.calls.values().sum())
            .unwrap_or(0)
    }

    pub fn contains(&self, playlist_id: &PlaylistId) -> bool {
        self.state
            .lock()
            .map(|s| s.headers.contains_key(playlist_id))
            .unwrap_or(false)
    }

    /// Lock state, count the call and apply any scripted failure for `op`.
    fn enter(&self, op: GatewayOp) -> Result<MutexGuard<'_, State>, GatewayError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| GatewayError::Fatal("gateway state poisoned".into()))?;
        *state.calls.entry(op).or_default() += 1;

        if let Some(err) = state.fail_next.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(err) = state.fail_always.get(&op) {
            return Err(err.clone());
        }
        Ok(state)
    }
}

#[async_trait]
impl PlaylistGateway for InMemoryGateway {
    async fn list_playlists(&self, _token: &AccessToken) -> Result<Vec<PlaylistHeader>, GatewayError> {
        let state = self.enter(GatewayOp::ListPlaylists)?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.headers.get(id).cloned())
            .collect())
    }

    async fn get_playlist(&self, _token: &AccessToken, playlist_id: &PlaylistId) -> Result<PlaylistHeader, GatewayError> {
        let state = self.enter(GatewayOp::GetPlaylist)?;
        state
            .headers
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("playlist {playlist_id}")))
    }

    async fn list_playlist_video_ids(
        &self,
        _token: &AccessToken,
        playlist_id: &PlaylistId,
    ) -> Result<Vec<VideoId>, GatewayError> {
        let state = self.enter(GatewayOp::ListVideoIds)?;
        state
            .items
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("playlist {playlist_id}")))
    }

    async fn get_video(&self, _token: &AccessToken, video_id: &VideoId) -> Result<Video, GatewayError> {
        let state = self.enter(GatewayOp::GetVideo)?;
        if let Some(err) = state.broken_videos.get(video_id) {
            return Err(err.clone());
        }
        state
            .videos
            .get(video_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("video {video_id}")))
    }

    async fn create_playlist(
        &self,
        _token: &AccessToken,
        title: &str,
        description: &str,
    ) -> Result<PlaylistId, GatewayError> {
        let mut state = self.enter(GatewayOp::CreatePlaylist)?;
        state.next_id += 1;
        let id = PlaylistId::new(format!("PLnew{}", state.next_id));

        state.order.push(id.clone());
        state.headers.insert(
            id.clone(),
            PlaylistHeader {
                id: id.clone(),
                channel_id: String::new(),
                title: title.to_string(),
                description: description.to_string(),
                published_at: chrono::Utc::now(),
            },
        );
        state.items.insert(id.clone(), Vec::new());
        state.created.push(CreatedPlaylist {
            id: id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            videos: Vec::new(),
        });
        Ok(id)
    }

    async fn add_video(
        &self,
        _token: &AccessToken,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> Result<(), GatewayError> {
        let mut state = self.enter(GatewayOp::AddVideo)?;
        if let Some(err) = state.rejected_adds.get(video_id) {
            return Err(err.clone());
        }
        let Some(items) = state.items.get_mut(playlist_id) else {
            return Err(GatewayError::NotFound(format!("playlist {playlist_id}")));
        };
        items.push(video_id.clone());
        if let Some(created) = state.created.iter_mut().find(|c| &c.id == playlist_id) {
            created.videos.push(video_id.clone());
        }
        Ok(())
    }

    async fn delete_playlist(&self, _token: &AccessToken, playlist_id: &PlaylistId) -> Result<(), GatewayError> {
        let mut state = self.enter(GatewayOp::DeletePlaylist)?;
        if state.headers.remove(playlist_id).is_none() {
            return Err(GatewayError::NotFound(format!("playlist {playlist_id}")));
        }
        state.items.remove(playlist_id);
        state.order.retain(|id| id != playlist_id);
        Ok(())
    }
}
