//! Application layer - the relay core.
//!
//! - [`registry`] - open client connections
//! - [`hub`] - fan-out of each event to every connection
//! - [`subscription_manager`] - upstream subscription and reconnect loop
//! - [`health_reporter`] - point-in-time status
//! - [`relay`] - wiring and lifecycle

mod backoff;
pub mod health_reporter;
pub mod hub;
pub mod registry;
pub mod relay;
mod shutdown;
pub mod subscription_manager;

pub use backoff::Backoff;
pub use health_reporter::HealthReporter;
pub use hub::{BroadcastHub, BroadcastReport};
pub use registry::{Connection, ConnectionId, ConnectionRegistry, DeliveryError, RegistryError};
pub use relay::{ConnectionSettings, Relay};
pub use subscription_manager::SubscriptionManager;
