//! HTTP adapter for the health endpoint.

mod handlers;
mod routes;

pub use handlers::health_check;
pub use routes::health_routes;
