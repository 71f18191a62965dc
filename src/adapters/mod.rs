//! Adapters - Implementations of port interfaces and the HTTP surface.
//!
//! - `broker` - Broker subscribers (in-memory, Redis)
//! - `http` - Health endpoint and top-level router
//! - `websocket` - Live client connections

pub mod broker;
pub mod http;
pub mod websocket;

pub use broker::{InMemoryBroker, RedisSubscriber};
pub use http::relay_router;
pub use websocket::WebSocketState;
