use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::root))
        // The pipeline
        .route("/analyze", post(handlers::analyze))
        // Convenience download endpoint
        .route("/report/csv", get(handlers::report_csv))
        // Schema cache management
        .route("/schema/refresh", post(handlers::refresh_schema))
        // Liveness of the two external collaborators
        .route("/health/db", get(handlers::health_db))
        .route("/health/ai", get(handlers::health_ai))
}
