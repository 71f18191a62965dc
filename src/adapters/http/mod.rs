//! HTTP adapters - the relay's public surface.
//!
//! - [`health`] - `GET /health`
//! - [`router`] - composes the health and WebSocket routes with CORS and
//!   request tracing

pub mod health;
pub mod router;

pub use health::health_routes;
pub use router::relay_router;
