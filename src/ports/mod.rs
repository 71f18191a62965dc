//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the relay core and the outside world. Adapters implement these ports.
//!
//! - `BrokerSubscriber` - Opens a message stream on a pub/sub channel

mod broker_subscriber;

pub use broker_subscriber::{BrokerError, BrokerSubscriber, MessageStream};
