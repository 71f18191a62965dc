//! In-memory broker implementation for testing.
//!
//! Provides deterministic pub/sub delivery plus knobs to simulate outages.
//!
//! # Security Note
//!
//! This adapter is for **testing only** and should not be used in production.
//! It uses `.expect()` on lock operations which will panic if locks are poisoned.
//! Production code should use the Redis subscriber.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::ports::{BrokerError, BrokerSubscriber, MessageStream};

type Subscriber = (String, mpsc::UnboundedSender<Result<String, BrokerError>>);

#[derive(Default)]
struct BrokerState {
    subscribers: Vec<Subscriber>,
    available: bool,
    subscribe_count: usize,
    failed_attempts: usize,
}

/// In-memory pub/sub broker for testing.
///
/// Features:
/// - Publish to a channel and reach every open subscription on it
/// - Drop every subscription to simulate a lost connection
/// - Refuse new subscriptions to simulate an unreachable broker
///
/// # Panics
///
/// Methods may panic if the internal lock is poisoned. This is acceptable
/// for test code but this adapter should NOT be used in production.
///
/// # Example
///
/// ```ignore
/// let broker = Arc::new(InMemoryBroker::new());
/// broker.publish("ticket_events", r#"{"kind":"ticket_created"}"#);
/// broker.disconnect_all();
/// ```
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    /// Creates an available broker with no subscriptions.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState {
                available: true,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrokerState> {
        self.state.lock().expect("InMemoryBroker: lock poisoned")
    }

    /// Publish a message; returns how many subscriptions received it.
    pub fn publish(&self, channel: &str, message: impl Into<String>) -> usize {
        self.send(channel, Ok(message.into()))
    }

    /// Deliver an error item to subscribers of `channel`.
    pub fn publish_error(&self, channel: &str, error: BrokerError) -> usize {
        self.send(channel, Err(error))
    }

    fn send(&self, channel: &str, item: Result<String, BrokerError>) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());

        let mut reached = 0;
        for (_, tx) in state.subscribers.iter().filter(|(name, _)| name == channel) {
            if tx.send(item.clone()).is_ok() {
                reached += 1;
            }
        }
        reached
    }

    /// End every open subscription stream.
    pub fn disconnect_all(&self) {
        self.lock().subscribers.clear();
    }

    /// Accept or refuse new subscriptions.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Open subscriptions on `channel`.
    pub fn active_subscribers(&self, channel: &str) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|(name, tx)| name == channel && !tx.is_closed())
            .count()
    }

    /// Successful subscribe calls so far.
    pub fn subscribe_count(&self) -> usize {
        self.lock().subscribe_count
    }

    /// Refused subscribe calls so far.
    pub fn failed_attempts(&self) -> usize {
        self.lock().failed_attempts
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerSubscriber for InMemoryBroker {
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BrokerError> {
        let mut state = self.lock();
        if !state.available {
            state.failed_attempts += 1;
            return Err(BrokerError::Connection("broker unavailable".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push((channel.to_string(), tx));
        state.subscribe_count += 1;

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "InMemoryBroker"
    }
}
