use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use playsort_core::UserId;
use playsort_infra::credentials::{AccessToken, InMemoryCredentialStore};

use crate::context::{RequestId, UserContext};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Default)]
pub struct UserState {
    /// When set, a bearer token on the request is stored as the caller's access token.
    pub token_seed: Option<Arc<InMemoryCredentialStore>>,
}

/// Resolve the caller from `X-User-Id`. Identity is authenticated upstream.
pub async fn user_middleware(
    State(state): State<UserState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = extract_user_id(req.headers())?;

    if let Some(store) = &state.token_seed {
        if let Some(token) = extract_bearer(req.headers()) {
            store.insert(user_id.clone(), AccessToken::new(token));
        }
    }

    req.extensions_mut().insert(UserContext::new(user_id));
    Ok(next.run(req).await)
}

/// Tag the request with an id and run it inside a span carrying it.
pub async fn request_id_middleware(mut req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));
    let span = tracing::info_span!(
        "http_request",
        method = %req.method(),
        path = %req.uri().path(),
        request_id = %id,
    );

    let mut res = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

fn extract_user_id(headers: &HeaderMap) -> Result<UserId, StatusCode> {
    let raw = headers
        .get(USER_ID_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?
        .trim();

    if raw.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(UserId::new(raw))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();

    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn user_id_is_required_and_trimmed() {
        assert_eq!(extract_user_id(&headers(&[])), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_user_id(&headers(&[("x-user-id", "  ")])), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_user_id(&headers(&[("x-user-id", " u1 ")])), Ok(UserId::new("u1")));
    }

    #[test]
    fn bearer_token_is_optional() {
        assert_eq!(extract_bearer(&headers(&[])), None);
        assert_eq!(extract_bearer(&headers(&[("authorization", "Basic abc")])), None);
        assert_eq!(extract_bearer(&headers(&[("authorization", "Bearer ")])), None);
        assert_eq!(extract_bearer(&headers(&[("authorization", "Bearer ya29.x")])), Some("ya29.x"));
    }
}
