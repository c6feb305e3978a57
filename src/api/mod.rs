mod handlers;
mod routes;

use crate::config::Config;
use crate::gatekeeper::Gatekeeper;
use crate::models::user::UserId;
use crate::store::RelationStore;
use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared API state: the relation store plus the bootstrapped sessions
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn RelationStore>,
    pub sessions: Arc<tokio::sync::Mutex<HashMap<UserId, Arc<Gatekeeper>>>>,
}

impl ApiState {
    pub fn new(store: Arc<dyn RelationStore>) -> Self {
        Self {
            store,
            sessions: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }
}

/// Start the API server
pub async fn start_api_server(store: Arc<dyn RelationStore>) -> Result<()> {
    let config = Config::get();

    // Set up CORS
    let cors = if config.api.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::permissive()
    };

    let state = ApiState::new(store);

    // Create router with all routes
    let app = Router::new()
        // General routes
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::get_metrics))
        // Session lifecycle
        .route(
            "/api/sessions/:user",
            post(handlers::sessions::create_session).delete(handlers::sessions::delete_session),
        )
        .route("/api/sessions/:user/ban", get(handlers::sessions::get_ban_status))
        .route("/api/sessions/:user/heartbeat", post(handlers::sessions::heartbeat))
        .route("/api/sessions/:user/hidden", post(handlers::sessions::hidden))
        // Relation edges
        .route(
            "/api/sessions/:user/relations/:kind",
            get(handlers::relations::list_relations),
        )
        .route(
            "/api/sessions/:user/relations/:kind/:target",
            put(handlers::relations::put_relation).delete(handlers::relations::delete_relation),
        )
        // Decisions and feed composition
        .route(
            "/api/sessions/:user/evaluate/:target/:interaction",
            get(handlers::decisions::evaluate),
        )
        .route(
            "/api/sessions/:user/feed-exclusions/:surface",
            get(handlers::decisions::feed_exclusions),
        )
        .route(
            "/api/sessions/:user/held-for-review/:author",
            get(handlers::decisions::held_for_review),
        )
        .route("/api/hidden-pair/:a/:b", get(handlers::decisions::hidden_pair))
        // Presence
        .route("/api/presence/:user", get(handlers::presence::get_presence))
        // Administrative
        .route("/api/admin/bans", post(handlers::admin::create_ban))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Get bind address
    let addr = format!("{}:{}", config.api.host, config.api.port).parse::<SocketAddr>()?;

    // Start server
    info!("Starting API server on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
