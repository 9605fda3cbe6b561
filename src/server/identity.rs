//! Caller identity from headers set by the authenticating proxy.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

use super::state::AppState;
use crate::core::schemas::UserInfo;

pub const USERNAME_HEADER: &str = "X-Forwarded-Preferred-Username";
pub const EMAIL_HEADER: &str = "X-Forwarded-Email";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// User id from the configured header, `None` when absent.
pub fn caller(state: &AppState, headers: &HeaderMap) -> Option<String> {
    header_value(headers, &state.config.user_id_header)
}

pub async fn userinfo_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<UserInfo> {
    Json(UserInfo {
        userid: caller(&state, &headers),
        username: header_value(&headers, USERNAME_HEADER),
        email: header_value(&headers, EMAIL_HEADER),
    })
}
