// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use tracing::debug;

use crate::api::handlers::session_for;
use crate::api::routes::{error, ok, store_error};
use crate::api::ApiState;
use crate::models::relation::{OutgoingEdge, RelationAttrs, RelationKind};
use crate::models::user::UserId;

/// Response type for an outgoing edge listing
#[derive(Debug, Serialize)]
pub struct RelationListResponse {
    pub kind: RelationKind,
    pub edges: Vec<OutgoingEdge>,
    pub total: usize,
}

fn parse_kind(kind: &str) -> Result<RelationKind, Response> {
    kind.parse::<RelationKind>()
        .map_err(|e| error(StatusCode::BAD_REQUEST, e))
}

/// Create or update one of the session user's outgoing edges
pub async fn put_relation(
    State(state): State<ApiState>,
    Path((user, kind, target)): Path<(String, String, String)>,
    attrs: Option<Json<RelationAttrs>>,
) -> Response {
    let user = UserId::new(user);
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let attrs = attrs.map(|Json(a)| a).unwrap_or_default();
    debug!("put {} edge {} -> {}", kind.as_str(), user, target);

    match session_for(&state, &user).await {
        Ok(gatekeeper) => {
            match gatekeeper
                .set_relation(kind, &UserId::new(target), Some(attrs))
                .await
            {
                Ok(()) => ok(serde_json::json!({ "stored": true })),
                Err(e) => store_error(e),
            }
        }
        Err(resp) => resp,
    }
}

/// Remove one of the session user's outgoing edges; removing a missing
/// edge reports success
pub async fn delete_relation(
    State(state): State<ApiState>,
    Path((user, kind, target)): Path<(String, String, String)>,
) -> Response {
    let user = UserId::new(user);
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    debug!("remove {} edge {} -> {}", kind.as_str(), user, target);

    match session_for(&state, &user).await {
        Ok(gatekeeper) => {
            match gatekeeper
                .set_relation(kind, &UserId::new(target), None)
                .await
            {
                Ok(()) => ok(serde_json::json!({ "removed": true })),
                Err(e) => store_error(e),
            }
        }
        Err(resp) => resp,
    }
}

/// List the session user's outgoing edges of one kind. Only outgoing edges
/// are listable; incoming edges have no read path here.
pub async fn list_relations(
    State(state): State<ApiState>,
    Path((user, kind)): Path<(String, String)>,
) -> Response {
    let user = UserId::new(user);
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };

    match state.store.list_outgoing(kind, &user).await {
        Ok(edges) => {
            let total = edges.len();
            ok(RelationListResponse { kind, edges, total })
        }
        Err(e) => store_error(e),
    }
}
