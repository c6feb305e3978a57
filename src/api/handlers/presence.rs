// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;

use crate::api::routes::{error, ok, store_error};
use crate::api::ApiState;
use crate::models::user::UserId;

/// Point-in-time read of a user's presence row
pub async fn get_presence(State(state): State<ApiState>, Path(user): Path<String>) -> Response {
    let user = UserId::new(user);
    match state.store.read_presence(&user).await {
        Ok(Some(record)) => ok(record),
        Ok(None) => error(StatusCode::NOT_FOUND, format!("no presence for {}", user)),
        Err(e) => store_error(e),
    }
}
