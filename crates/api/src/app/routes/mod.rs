use axum::Router;

pub mod playlists;
pub mod system;

/// Router for all endpoints that need a caller identity.
pub fn router() -> Router {
    Router::new().nest("/playlists", playlists::router())
}
