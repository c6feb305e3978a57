// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::api::handlers::session_for;
use crate::api::routes::{error, ok, store_error};
use crate::api::ApiState;
use crate::evaluator::{Interaction, Surface};
use crate::models::relation::RelationKind;
use crate::models::user::UserId;

/// Response for a hidden-pair check
#[derive(Debug, Serialize)]
pub struct HiddenPairResponse {
    pub hidden: bool,
}

/// Evaluate one interaction between the session user and a target
pub async fn evaluate(
    State(state): State<ApiState>,
    Path((user, target, interaction)): Path<(String, String, String)>,
) -> Response {
    let user = UserId::new(user);
    let interaction = match interaction.parse::<Interaction>() {
        Ok(interaction) => interaction,
        Err(e) => return error(StatusCode::BAD_REQUEST, e),
    };
    debug!("evaluating {:?} for {} -> {}", interaction, user, target);

    match session_for(&state, &user).await {
        Ok(gatekeeper) => match gatekeeper.evaluate(&UserId::new(target), interaction).await {
            Ok(decision) => ok(decision),
            Err(e) => store_error(e),
        },
        Err(resp) => resp,
    }
}

/// Authors excluded from one of the session user's aggregated feeds
pub async fn feed_exclusions(
    State(state): State<ApiState>,
    Path((user, surface)): Path<(String, String)>,
) -> Response {
    let user = UserId::new(user);
    let surface = match surface.parse::<Surface>() {
        Ok(surface) => surface,
        Err(e) => return error(StatusCode::BAD_REQUEST, e),
    };

    match session_for(&state, &user).await {
        Ok(gatekeeper) => {
            let mut excluded: Vec<UserId> =
                gatekeeper.excluded_authors(surface).into_iter().collect();
            excluded.sort();
            ok(excluded)
        }
        Err(resp) => resp,
    }
}

/// Whether the session user restricts an author, deciding if that author's
/// comments and messages land in the review queue. Only the restrictor's
/// own session can ask.
pub async fn held_for_review(
    State(state): State<ApiState>,
    Path((user, author)): Path<(String, String)>,
) -> Response {
    let user = UserId::new(user);
    match session_for(&state, &user).await {
        Ok(gatekeeper) => ok(json!({ "held": gatekeeper.restricts(&UserId::new(author)) })),
        Err(resp) => resp,
    }
}

/// Whether a block in either direction removes this pair from search and
/// explore. The direction is not part of the answer.
pub async fn hidden_pair(
    State(state): State<ApiState>,
    Path((a, b)): Path<(String, String)>,
) -> Response {
    let (a, b) = (UserId::new(a), UserId::new(b));
    let forward = state.store.exists(RelationKind::Block, &a, &b);
    let reverse = state.store.exists(RelationKind::Block, &b, &a);
    match futures::try_join!(forward, reverse) {
        Ok((ab, ba)) => ok(HiddenPairResponse { hidden: ab || ba }),
        Err(e) => store_error(e),
    }
}
