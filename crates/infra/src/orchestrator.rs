//! Playlist use cases (application-level orchestration).
//!
//! `PlaylistService` composes the credential store, the remote gateway, the
//! snapshot cache and the error classifier:
//!
//! ```text
//! reorder(playlist_id, criterion, user)
//!   ↓
//! 1. Parse criterion (unknown → InvalidArgument, nothing else happens)
//!   ↓
//! 2. Resolve the user's access token
//!   ↓
//! 3. Fetch the playlist live from the gateway (never from cache)
//!   ↓
//! 4. Sort the owned copy
//!   ↓
//! 5. Publish it remotely as a new playlist
//!   ↓
//! 6. Cache the sorted snapshot under the original playlist id
//! ```
//!
//! Gateway failures at steps 3 and 5 go through the classifier, which may
//! schedule a deferred retry. A failure at step 5 leaves the cache untouched.
//!
//! No mutable state is shared between calls; each request owns the playlist
//! value it fetched.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument};

use playsort_core::{DomainError, Playlist, PlaylistId, SortCriterion, UserId};
use playsort_events::MessageQueue;

use crate::cache::{CacheError, SnapshotCache};
use crate::classifier::{ErrorClassifier, RetryContext};
use crate::credentials::{AccessToken, CredentialError, CredentialStore};
use crate::gateway::{GatewayError, PlaylistGateway, PublishReport};

pub const ACTION_REORDER: &str = "reorder_playlist";
pub const ACTION_LIST_ALL: &str = "get_all_playlists";
pub const ACTION_DELETE: &str = "delete_playlist";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReorderError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The platform refused for quota reasons; a retry has been queued.
    #[error("quota exceeded, retry scheduled at {retry_at}")]
    QuotaExceeded { retry_at: DateTime<Utc> },

    /// A quota retry should have been queued but could not be.
    #[error("failed to schedule retry: {0}")]
    RetryScheduling(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<DomainError> for ReorderError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument(msg) | DomainError::InvalidId(msg) => Self::InvalidArgument(msg),
            DomainError::NotFound(what) => Self::NotFound(what),
            DomainError::InvalidDuration(msg) => Self::Unexpected(msg),
        }
    }
}

impl From<CacheError> for ReorderError {
    fn from(value: CacheError) -> Self {
        match value {
            CacheError::NotFound(id) => Self::NotFound(format!("playlist {id}")),
            other => Self::Unexpected(other.to_string()),
        }
    }
}

impl From<CredentialError> for ReorderError {
    fn from(value: CredentialError) -> Self {
        Self::Unexpected(value.to_string())
    }
}

#[derive(Debug)]
pub struct PlaylistService<G, C, S, Q> {
    gateway: G,
    cache: C,
    credentials: S,
    classifier: ErrorClassifier<Q>,
}

impl<G, C, S, Q> PlaylistService<G, C, S, Q>
where
    G: PlaylistGateway,
    C: SnapshotCache,
    S: CredentialStore,
    Q: MessageQueue,
{
    pub fn new(gateway: G, cache: C, credentials: S, classifier: ErrorClassifier<Q>) -> Self {
        Self {
            gateway,
            cache,
            credentials,
            classifier,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Reorder a playlist and materialize the result as a new remote playlist.
    #[instrument(skip(self), fields(playlist_id = %playlist_id, user_id = %user_id), err)]
    pub async fn reorder(
        &self,
        playlist_id: &PlaylistId,
        criterion: &str,
        user_id: &UserId,
    ) -> Result<PublishReport, ReorderError> {
        let sort: SortCriterion = criterion.parse()?;
        let token = self.token(user_id).await?;
        let ctx = || RetryContext::new(ACTION_REORDER, playlist_id.clone(), sort.as_str(), user_id.clone());

        let playlist = match self.gateway.fetch_playlist(&token, playlist_id).await {
            Ok(p) => p,
            Err(err) => return Err(self.classify(err, ctx()).await),
        };

        let sorted = playlist.sorted(sort);

        let report = match self.gateway.publish_reordered(&token, &sorted).await {
            Ok(r) => r,
            Err(err) => return Err(self.classify(err, ctx()).await),
        };

        self.cache.set(user_id, &sorted).await.map_err(|e| ReorderError::Unexpected(e.to_string()))?;

        info!(
            criterion = sort.as_str(),
            new_playlist_id = %report.playlist_id,
            added = report.added,
            skipped = report.skipped,
            "playlist reordered"
        );
        Ok(report)
    }

    /// All of the user's playlists, cache first.
    ///
    /// A non-empty cached listing is returned as-is. Otherwise the remote
    /// listing is fetched, cached and returned.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn list_playlists(&self, user_id: &UserId) -> Result<Vec<Playlist>, ReorderError> {
        let cached = self.cache.get_all(user_id).await?;
        if !cached.is_empty() {
            info!(count = cached.len(), "playlists served from cache");
            return Ok(cached);
        }

        let token = self.token(user_id).await?;
        let playlists = match self.gateway.fetch_all_playlists(&token).await {
            Ok(p) => p,
            Err(err) => {
                let ctx = RetryContext::new(ACTION_LIST_ALL, PlaylistId::new(""), "", user_id.clone());
                return Err(self.classify(err, ctx).await);
            }
        };

        self.cache.set_all(user_id, &playlists).await?;
        info!(count = playlists.len(), "playlists fetched and cached");
        Ok(playlists)
    }

    /// Delete a playlist remotely, then evict it from the cache.
    #[instrument(skip(self), fields(playlist_id = %playlist_id, user_id = %user_id), err)]
    pub async fn delete_playlist(&self, playlist_id: &PlaylistId, user_id: &UserId) -> Result<(), ReorderError> {
        let token = self.token(user_id).await?;
        if let Err(err) = self.gateway.delete_playlist(&token, playlist_id).await {
            let ctx = RetryContext::new(ACTION_DELETE, playlist_id.clone(), "", user_id.clone());
            return Err(self.classify(err, ctx).await);
        }

        match self.cache.delete(playlist_id).await {
            // Never cached: nothing to evict.
            Ok(()) | Err(CacheError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn token(&self, user_id: &UserId) -> Result<AccessToken, ReorderError> {
        Ok(self.credentials.access_token(user_id).await?)
    }

    async fn classify(&self, err: GatewayError, ctx: RetryContext) -> ReorderError {
        self.classifier.classify(err, ctx).await
    }
}
