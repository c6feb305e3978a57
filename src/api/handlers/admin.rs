// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::routes::{ok, store_error};
use crate::api::ApiState;
use crate::models::ban::{BanRecord, BanType};
use crate::models::user::UserId;

#[derive(Debug, Deserialize)]
pub struct CreateBanRequest {
    pub user: UserId,
    pub reason: String,
    pub ban_type: BanType,
    pub expires_at: Option<NaiveDateTime>,
}

/// Append a ban row for a user. Rows are never deleted; a later row
/// supersedes this one. Affected live sessions re-evaluate via the
/// ban-table push.
pub async fn create_ban(
    State(state): State<ApiState>,
    Json(req): Json<CreateBanRequest>,
) -> Response {
    info!(
        "recording {} ban for {}: {}",
        req.ban_type.as_str(),
        req.user,
        req.reason
    );

    let record = BanRecord {
        user: req.user,
        reason: req.reason,
        ban_type: req.ban_type,
        expires_at: req.expires_at,
        created_at: Utc::now().naive_utc(),
    };
    match state.store.insert_ban(record).await {
        Ok(()) => ok(json!({ "recorded": true })),
        Err(e) => store_error(e),
    }
}
