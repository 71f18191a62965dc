//! BrokerSubscriber port - Interface for consuming one pub/sub channel.
//!
//! The subscription manager only sees a stream of raw text messages; it does
//! not know whether they come from Redis or from an in-memory test broker.
//!
//! ## Stream contract
//!
//! - `Some(Ok(text))` - one published message
//! - `Some(Err(BrokerError::Payload(_)))` - one unreadable message; the
//!   subscription is still alive
//! - `Some(Err(other))` or `None` - the subscription is gone and must be
//!   re-established
//!
//! Dropping the stream unsubscribes.

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Messages received on a subscribed channel.
pub type MessageStream = BoxStream<'static, Result<String, BrokerError>>;

/// Errors raised by broker subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Broker subscribe error: {0}")]
    Subscribe(String),

    #[error("Broker message error: {0}")]
    Payload(String),

    #[error("Broker did not respond within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Broker subscription stream ended")]
    StreamEnded,
}

impl BrokerError {
    /// True when only a single message is affected and the subscription
    /// remains usable.
    pub fn is_message_level(&self) -> bool {
        matches!(self, BrokerError::Payload(_))
    }
}

/// Port for subscribing to a broker channel.
///
/// # Example
///
/// ```ignore
/// let mut messages = subscriber.subscribe("ticket_events").await?;
/// while let Some(message) = messages.next().await {
///     // ...
/// }
/// ```
#[async_trait]
pub trait BrokerSubscriber: Send + Sync {
    /// Open a fresh connection and subscribe to `channel`.
    ///
    /// Every call establishes a new subscription; callers reconnect by
    /// calling this again after the previous stream ended.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BrokerError>;

    /// Subscriber name for logging.
    fn name(&self) -> &'static str;
}
