//! WebSocket adapter for live event delivery.
//!
//! Each accepted socket is backed by a bounded outbound queue registered
//! with the [`ConnectionRegistry`](crate::application::ConnectionRegistry).
//! The broadcast hub fills the queues; the per-socket writer drains them.
//!
//! # Components
//!
//! - [`handler`] - Axum WebSocket upgrade handler and connection lifecycle

pub mod handler;

pub use handler::{websocket_router, ws_handler, WebSocketState};
