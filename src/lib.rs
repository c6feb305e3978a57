pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluator;
pub mod gate;
pub mod gatekeeper;
pub mod metrics;
pub mod models;
pub mod presence;
pub mod schema;
pub mod store;
