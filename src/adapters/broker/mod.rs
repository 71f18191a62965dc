//! Broker adapters - implementations of [`BrokerSubscriber`](crate::ports::BrokerSubscriber).
//!
//! - `InMemoryBroker` - deterministic pub/sub for tests
//! - `RedisSubscriber` - Redis pub/sub for production

mod in_memory;
mod redis;

pub use in_memory::InMemoryBroker;
pub use self::redis::RedisSubscriber;
