use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;

use playsort_core::PlaylistId;
use playsort_infra::cache::PlaylistSnapshot;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/all", get(list_playlists))
        .route("/reorder", post(reorder_playlist))
        .route("/validate", get(validate))
        .route("/:id", delete(delete_playlist))
}

pub async fn list_playlists(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
) -> axum::response::Response {
    match services.playlists.list_playlists(user.user_id()).await {
        Ok(playlists) => {
            let body: Vec<PlaylistSnapshot> = playlists.iter().map(PlaylistSnapshot::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::reorder_error_to_response(e),
    }
}

pub async fn reorder_playlist(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    body: Result<Json<dto::ReorderRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text());
        }
    };

    let (Some(playlist_id), Some(criteria)) = (non_blank(body.playlist_id), non_blank(body.criteria)) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "playlist_id and criteria are required",
        );
    };

    match services
        .playlists
        .reorder(&PlaylistId::new(playlist_id), &criteria, user.user_id())
        .await
    {
        Ok(report) => (StatusCode::OK, Json(dto::ReorderResponse::from(report))).into_response(),
        Err(e) => errors::reorder_error_to_response(e),
    }
}

pub async fn delete_playlist(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match services
        .playlists
        .delete_playlist(&PlaylistId::new(id), user.user_id())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::reorder_error_to_response(e),
    }
}

pub async fn validate() -> impl IntoResponse {
    Json(json!({ "valid": true }))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
