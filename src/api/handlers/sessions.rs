// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::api::handlers::session_for;
use crate::api::routes::{error, ok, store_error};
use crate::api::ApiState;
use crate::gatekeeper::{Gatekeeper, SessionContext};
use crate::models::user::UserId;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub is_admin: bool,
}

/// Bootstrap a gatekeeper session for a user. Re-posting for an existing
/// session just reports its current ban status.
pub async fn create_session(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    body: Option<Json<CreateSessionRequest>>,
) -> Response {
    let user = UserId::new(user);
    debug!("bootstrapping session for {}", user);

    {
        let sessions = state.sessions.lock().await;
        if let Some(existing) = sessions.get(&user) {
            return ok(json!({ "ban": existing.current_ban_status() }));
        }
    }

    let mut session = SessionContext::new(user.clone());
    session.is_admin = body.map(|Json(b)| b.is_admin).unwrap_or(false);

    match Gatekeeper::bootstrap(session, state.store.clone()).await {
        Ok(gatekeeper) => {
            let status = gatekeeper.current_ban_status();
            state
                .sessions
                .lock()
                .await
                .insert(user, Arc::new(gatekeeper));
            ok(json!({ "ban": status }))
        }
        Err(e) => store_error(e),
    }
}

/// Sign a session out: presence goes offline and the session is dropped
pub async fn delete_session(
    State(state): State<ApiState>,
    Path(user): Path<String>,
) -> Response {
    let user = UserId::new(user);
    let Some(gatekeeper) = state.sessions.lock().await.remove(&user) else {
        return error(StatusCode::NOT_FOUND, format!("no session for {}", user));
    };
    match gatekeeper.sign_out().await {
        Ok(()) => ok(json!({ "signed_out": true })),
        Err(e) => store_error(e),
    }
}

/// Current suspension state for the session holder
pub async fn get_ban_status(
    State(state): State<ApiState>,
    Path(user): Path<String>,
) -> Response {
    let user = UserId::new(user);
    match session_for(&state, &user).await {
        Ok(gatekeeper) => ok(gatekeeper.current_ban_status()),
        Err(resp) => resp,
    }
}

/// Visibility regained / periodic heartbeat re-assertion
pub async fn heartbeat(State(state): State<ApiState>, Path(user): Path<String>) -> Response {
    let user = UserId::new(user);
    match session_for(&state, &user).await {
        Ok(gatekeeper) => match gatekeeper.mark_active().await {
            Ok(()) => ok(json!({ "online": true })),
            Err(e) => store_error(e),
        },
        Err(resp) => resp,
    }
}

/// Tab or window hidden
pub async fn hidden(State(state): State<ApiState>, Path(user): Path<String>) -> Response {
    let user = UserId::new(user);
    match session_for(&state, &user).await {
        Ok(gatekeeper) => match gatekeeper.mark_hidden().await {
            Ok(()) => ok(json!({ "online": false })),
            Err(e) => store_error(e),
        },
        Err(resp) => resp,
    }
}
