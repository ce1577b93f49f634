//! API route definitions

use axum::routing::get;
use axum::routing::post;
use axum::Router;

use super::handlers;
use super::handlers::AppState;

/// Create the service router
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        // Liveness and metadata
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Pipeline endpoints
        .route("/detect", post(handlers::detect))
        .route("/search", post(handlers::search))
        .route("/analyze-outfit", post(handlers::analyze_outfit))
        .with_state(state)
}
