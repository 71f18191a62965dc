//! Top-level router for the relay.

use axum::Router;
use http::{HeaderValue, Method};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::{websocket_router, WebSocketState};
use crate::application::Relay;

use super::health::health_routes;

/// Build the relay router: `GET /health` and `GET /ws`.
///
/// Origins that are not valid header values are skipped with a warning.
pub fn relay_router(relay: &Relay, cors_origins: &[String]) -> Router {
    let ws_state = WebSocketState::new(relay.registry(), relay.connection_settings());

    Router::new()
        .merge(health_routes(relay.health()))
        .merge(websocket_router().with_state(ws_state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST])
}
