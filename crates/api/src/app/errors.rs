use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use playsort_infra::orchestrator::ReorderError;

pub fn reorder_error_to_response(err: ReorderError) -> axum::response::Response {
    match err {
        ReorderError::InvalidArgument(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_argument", msg),
        ReorderError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        ReorderError::QuotaExceeded { retry_at } => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(json!({
                "error": "quota_exceeded",
                "message": "YouTube quota exceeded; the request will be retried",
                "retry_at": retry_at.to_rfc3339(),
            })),
        )
            .into_response(),
        ReorderError::RetryScheduling(msg) => {
            tracing::error!(error = %msg, "quota retry could not be scheduled");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "retry_scheduling_error", msg)
        }
        ReorderError::Unexpected(msg) => {
            tracing::error!(error = %msg, "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
