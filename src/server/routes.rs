//! Route definitions for the API server

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Creates the main application router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Price collection
        .route("/collect", post(handlers::collect))
        // Analysis: run and persist, or read back stored rows
        .route(
            "/analysis/:symbol",
            post(handlers::run_analysis).get(handlers::get_results),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
