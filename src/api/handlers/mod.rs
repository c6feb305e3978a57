pub mod admin;
pub mod decisions;
pub mod health;
pub mod metrics;
pub mod presence;
pub mod relations;
pub mod sessions;

use axum::http::StatusCode;
use axum::response::Response;
use std::sync::Arc;

use crate::api::routes::error;
use crate::api::ApiState;
use crate::gatekeeper::Gatekeeper;
use crate::models::user::UserId;

/// Look up a bootstrapped session, or 404
pub(crate) async fn session_for(
    state: &ApiState,
    user: &UserId,
) -> Result<Arc<Gatekeeper>, Response> {
    let sessions = state.sessions.lock().await;
    sessions
        .get(user)
        .cloned()
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("no session for {}", user)))
}
