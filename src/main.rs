use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mys_social_gatekeeper::api;
use mys_social_gatekeeper::config::Config;
use mys_social_gatekeeper::db::init_database;
use mys_social_gatekeeper::store::postgres::PostgresRelationStore;
use mys_social_gatekeeper::store::RelationStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,mys_social_gatekeeper=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    Config::init()?;
    info!("Initialized configuration");

    // Initialize database and the relation store on top of it
    let db = Arc::new(init_database().await?);
    info!("Connected to database");
    let store: Arc<dyn RelationStore> = Arc::new(PostgresRelationStore::new(db));

    // Start API server
    let api_store = store.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::start_api_server(api_store).await {
            error!("API server error: {}", e);
        }
    });

    // Handle shutdown signals
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
        _ = api_handle => {
            error!("API server terminated unexpectedly");
        }
    }

    info!("MySocial gatekeeper shutdown complete");
    Ok(())
}
