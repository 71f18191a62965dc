//! HTTP handler for the health endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::HealthReporter;

/// GET /health - Report broker connectivity and live connection count
///
/// Returns 200 when healthy and 503 otherwise; the body is the same report
/// in both cases.
pub async fn health_check(State(reporter): State<HealthReporter>) -> Response {
    let report = reporter.report();
    let status = if report.status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
