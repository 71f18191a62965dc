//! Redis pub/sub subscriber for production deployments.
//!
//! Each `subscribe` call opens a dedicated connection (pooled or multiplexed
//! connections cannot enter SUBSCRIBE mode) and turns its message stream into
//! a [`MessageStream`]. When the server or network drops the connection the
//! stream ends, which the subscription manager treats as a lost subscription.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::config::RedisConfig;
use crate::ports::{BrokerError, BrokerSubscriber, MessageStream};

/// Redis-backed broker subscriber.
#[derive(Clone)]
pub struct RedisSubscriber {
    client: redis::Client,
    timeout: Duration,
}

impl RedisSubscriber {
    /// Create a subscriber for the configured Redis server.
    ///
    /// Only validates the URL; no connection is opened until `subscribe`.
    pub fn new(config: &RedisConfig) -> Result<Self, BrokerError> {
        let client = redis::Client::open(config.connection_url())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            timeout: config.timeout(),
        })
    }

    async fn open(&self, channel: &str) -> Result<MessageStream, BrokerError> {
        let connection = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let mut pubsub = connection.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        let messages = pubsub.into_on_message().map(|msg| {
            msg.get_payload::<String>()
                .map_err(|e| BrokerError::Payload(e.to_string()))
        });
        Ok(Box::pin(messages))
    }
}

#[async_trait]
impl BrokerSubscriber for RedisSubscriber {
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BrokerError> {
        match tokio::time::timeout(self.timeout, self.open(channel)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(self.timeout)),
        }
    }

    fn name(&self) -> &'static str {
        "RedisSubscriber"
    }
}

impl std::fmt::Debug for RedisSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSubscriber")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
