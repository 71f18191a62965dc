//! HTTP routes for the health endpoint.

use axum::{routing::get, Router};

use crate::application::HealthReporter;

use super::handlers::health_check;

/// Creates the health router.
pub fn health_routes(reporter: HealthReporter) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(reporter)
}
