//! Upstream subscription manager.
//!
//! Owns the single subscription to the broker channel, the subscription
//! state seen by the health reporter, and the reconnect loop:
//!
//! ```text
//! loop {
//!     Connecting ─ subscribe ─┬─ ok ──► Connected ─ pump messages ─ stream lost ─┐
//!                             └─ err ─────────────────────────────────────────────┤
//!     Disconnected ◄───────────────────────────────────────────────────────────────┘
//!     sleep(backoff)
//! }
//! shutdown ──► Closed
//! ```
//!
//! Messages missed while disconnected are not replayed.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::domain::{RelayEvent, SubscriptionPhase, SubscriptionState};
use crate::ports::{BrokerError, BrokerSubscriber, MessageStream};

use super::backoff::Backoff;
use super::shutdown::shutdown_signalled;

/// Why the message pump returned.
#[derive(Debug)]
enum PumpExit {
    Shutdown,
    Lost(String),
}

/// Maintains the upstream subscription and feeds decoded events to the hub.
pub struct SubscriptionManager {
    subscriber: Arc<dyn BrokerSubscriber>,
    channel: String,
    events: mpsc::Sender<Arc<RelayEvent>>,
    state: watch::Sender<SubscriptionState>,
    backoff: Backoff,
}

impl SubscriptionManager {
    /// Create a manager for `channel`.
    ///
    /// Decoded events go to `events`, normally the broadcast hub's inbound
    /// channel.
    pub fn new(
        subscriber: Arc<dyn BrokerSubscriber>,
        channel: impl Into<String>,
        events: mpsc::Sender<Arc<RelayEvent>>,
        backoff: Backoff,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::default());
        Self {
            subscriber,
            channel: channel.into(),
            events,
            state,
            backoff,
        }
    }

    /// Read-only view of the subscription state.
    pub fn state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    /// Spawn the subscription loop on the runtime.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run until `shutdown` turns true, then move to `Closed`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            channel = %self.channel,
            subscriber = self.subscriber.name(),
            "Starting upstream subscription"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.transition(SubscriptionPhase::Connecting, None);

            let subscribed = tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => break,
                result = self.subscriber.subscribe(&self.channel) => result,
            };

            match subscribed {
                Ok(messages) => {
                    self.transition(SubscriptionPhase::Connected, None);
                    self.backoff.reset();
                    tracing::info!(channel = %self.channel, "Subscribed to broker channel");

                    match self.pump(messages, &mut shutdown).await {
                        PumpExit::Shutdown => break,
                        PumpExit::Lost(reason) => {
                            tracing::warn!(channel = %self.channel, reason = %reason, "Broker subscription lost");
                            self.transition(SubscriptionPhase::Disconnected, Some(reason));
                        }
                    }
                }
                Err(e) => {
                    self.transition(SubscriptionPhase::Disconnected, Some(e.to_string()));
                }
            }

            let delay = self.backoff.next_delay();
            tracing::warn!(
                channel = %self.channel,
                retry_in_ms = delay.as_millis() as u64,
                "Broker unavailable, reconnecting after backoff"
            );
            tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(SubscriptionPhase::Closed, None);
        tracing::info!(channel = %self.channel, "Upstream subscription closed");
    }

    /// Forward messages until the stream is lost or shutdown is requested.
    ///
    /// Returning drops `messages`, which unsubscribes.
    async fn pump(
        &self,
        mut messages: MessageStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> PumpExit {
        loop {
            let message = tokio::select! {
                _ = shutdown_signalled(shutdown) => return PumpExit::Shutdown,
                message = messages.next() => message,
            };

            match message {
                Some(Ok(text)) => {
                    if !self.forward(&text, shutdown).await {
                        return PumpExit::Shutdown;
                    }
                }
                Some(Err(e)) if e.is_message_level() => {
                    tracing::warn!(error = %e, "Dropping unreadable broker message");
                }
                Some(Err(e)) => return PumpExit::Lost(e.to_string()),
                None => return PumpExit::Lost(BrokerError::StreamEnded.to_string()),
            }
        }
    }

    /// Decode and hand one message to the hub.
    ///
    /// Returns false when the relay is stopping and the loop should end.
    async fn forward(&self, text: &str, shutdown: &mut watch::Receiver<bool>) -> bool {
        let event = match RelayEvent::decode(text) {
            Ok(event) => Arc::new(event),
            Err(e) => {
                tracing::warn!(error = %e, bytes = text.len(), "Dropping malformed event");
                return true;
            }
        };

        tracing::debug!(kind = %event.kind(), "Received event");

        tokio::select! {
            sent = self.events.send(event) => {
                if sent.is_err() {
                    tracing::warn!("Broadcast hub is gone, stopping subscription");
                }
                sent.is_ok()
            }
            _ = shutdown_signalled(shutdown) => false,
        }
    }

    fn transition(&self, phase: SubscriptionPhase, error: Option<String>) {
        let current = self.state.borrow().clone();
        match current.advance(phase, error) {
            Ok(next) => {
                tracing::debug!(from = ?current.phase, to = ?next.phase, "Subscription state changed");
                self.state.send_replace(next);
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected subscription state change");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::broker::InMemoryBroker;
    use std::time::Duration;

    const CHANNEL: &str = "ticket_events";

    struct Harness {
        broker: Arc<InMemoryBroker>,
        events: mpsc::Receiver<Arc<RelayEvent>>,
        state: watch::Receiver<SubscriptionState>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    }

    fn start(broker: Arc<InMemoryBroker>) -> Harness {
        let (events_tx, events) = mpsc::channel(16);
        let manager = SubscriptionManager::new(
            broker.clone(),
            CHANNEL,
            events_tx,
            Backoff::new(Duration::from_millis(10), Duration::from_millis(40)),
        );
        let state = manager.state();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = manager.start(shutdown_rx);
        Harness {
            broker,
            events,
            state,
            shutdown,
            task,
        }
    }

    async fn wait_for_phase(state: &mut watch::Receiver<SubscriptionState>, phase: SubscriptionPhase) {
        tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| s.phase == phase))
            .await
            .expect("phase not reached in time")
            .expect("state sender dropped");
    }

    #[tokio::test]
    async fn forwards_decoded_events() {
        let mut h = start(Arc::new(InMemoryBroker::new()));
        wait_for_phase(&mut h.state, SubscriptionPhase::Connected).await;

        h.broker.publish(CHANNEL, r#"{"kind":"ticket_created","payload":{"id":1}}"#);

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.kind(), "ticket_created");
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped_and_loop_survives() {
        let mut h = start(Arc::new(InMemoryBroker::new()));
        wait_for_phase(&mut h.state, SubscriptionPhase::Connected).await;

        h.broker.publish(CHANNEL, r#"{"kind":"ticket_upd"#);
        h.broker.publish(CHANNEL, "not json at all");
        h.broker.publish_error(CHANNEL, BrokerError::Payload("invalid utf-8".into()));
        h.broker.publish(CHANNEL, r#"{"kind":"ticket_closed","payload":{}}"#);

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.kind(), "ticket_closed");
        assert!(h.state.borrow().is_connected());
    }

    #[tokio::test]
    async fn reconnects_after_disconnect() {
        let mut h = start(Arc::new(InMemoryBroker::new()));
        wait_for_phase(&mut h.state, SubscriptionPhase::Connected).await;

        h.broker.set_available(false);
        h.broker.disconnect_all();
        wait_for_phase(&mut h.state, SubscriptionPhase::Disconnected).await;
        assert!(h.state.borrow().last_error.is_some());

        h.broker.set_available(true);
        wait_for_phase(&mut h.state, SubscriptionPhase::Connected).await;
        assert!(h.broker.subscribe_count() >= 2);

        h.broker.publish(CHANNEL, r#"{"kind":"after_reconnect"}"#);
        assert_eq!(h.events.recv().await.unwrap().kind(), "after_reconnect");
    }

    #[tokio::test]
    async fn keeps_retrying_while_broker_is_down() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_available(false);
        let mut h = start(broker);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!h.state.borrow().is_connected());
        assert!(h.broker.failed_attempts() >= 2);

        h.broker.set_available(true);
        wait_for_phase(&mut h.state, SubscriptionPhase::Connected).await;
    }

    #[tokio::test]
    async fn shutdown_closes_and_unsubscribes() {
        let mut h = start(Arc::new(InMemoryBroker::new()));
        wait_for_phase(&mut h.state, SubscriptionPhase::Connected).await;
        assert_eq!(h.broker.active_subscribers(CHANNEL), 1);

        h.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), h.task)
            .await
            .expect("manager should stop")
            .unwrap();

        assert_eq!(h.state.borrow().phase, SubscriptionPhase::Closed);
        assert_eq!(h.broker.active_subscribers(CHANNEL), 0);
    }

    #[tokio::test]
    async fn shutdown_during_backoff_stops_promptly() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_available(false);
        let (events_tx, _events) = mpsc::channel(1);
        let manager = SubscriptionManager::new(
            broker,
            CHANNEL,
            events_tx,
            Backoff::new(Duration::from_secs(30), Duration::from_secs(30)),
        );
        let state = manager.state();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = manager.start(shutdown_rx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("manager should not wait out the backoff")
            .unwrap();
        assert_eq!(state.borrow().phase, SubscriptionPhase::Closed);
    }
}
