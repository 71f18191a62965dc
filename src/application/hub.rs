//! Broadcast hub - fans each upstream event out to every registered connection.
//!
//! # Event Flow
//!
//! ```text
//! SubscriptionManager ──(bounded mpsc)──► BroadcastHub::run
//!                                               │ publish(event)
//!                        ┌──────────────────────┼──────────────────────┐
//!                        ▼                      ▼                      ▼
//!                 queue of conn A        queue of conn B        queue of conn C
//!                 (send_timeout)         (send_timeout)         (send_timeout)
//! ```
//!
//! All deliveries of one event run concurrently, each bounded by the write
//! timeout. Events are published one at a time, so every connection sees
//! them in the order they arrived.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, watch};

use crate::domain::RelayEvent;

use super::registry::{Connection, ConnectionRegistry};
use super::shutdown::shutdown_signalled;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members in the snapshot.
    pub attempted: usize,
    /// Deliveries that reached the connection's queue.
    pub delivered: usize,
    /// Connections this broadcast removed because delivery failed or timed out.
    ///
    /// Members unregistered elsewhere while the broadcast was in flight are
    /// neither delivered nor dropped.
    pub dropped: usize,
}

enum Delivery {
    Delivered,
    Dropped,
    AlreadyGone,
}

/// Pushes events to every member of the connection registry.
pub struct BroadcastHub {
    registry: Arc<ConnectionRegistry>,
    write_timeout: Duration,
}

impl BroadcastHub {
    pub fn new(registry: Arc<ConnectionRegistry>, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    /// Deliver `event` to the members registered at call time.
    ///
    /// Never fails: a connection that cannot take the event within the write
    /// timeout is unregistered and the others are unaffected.
    pub async fn publish(&self, event: Arc<RelayEvent>) -> BroadcastReport {
        let members = self.registry.snapshot();
        let attempted = members.len();

        let outcomes = join_all(
            members
                .iter()
                .map(|connection| self.deliver_one(connection, event.clone())),
        )
        .await;

        let mut report = BroadcastReport {
            attempted,
            ..Default::default()
        };
        for outcome in &outcomes {
            match outcome {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Dropped => report.dropped += 1,
                Delivery::AlreadyGone => {}
            }
        }

        tracing::debug!(
            kind = %event.kind(),
            attempted = report.attempted,
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast complete"
        );
        report
    }

    async fn deliver_one(&self, connection: &Connection, event: Arc<RelayEvent>) -> Delivery {
        match connection.deliver(event, self.write_timeout).await {
            Ok(()) => Delivery::Delivered,
            Err(e) => {
                if self.registry.unregister(&connection.id()) {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        error = %e,
                        "Dropping connection after failed delivery"
                    );
                    Delivery::Dropped
                } else {
                    Delivery::AlreadyGone
                }
            }
        }
    }

    /// Consume events from the subscription manager until shutdown.
    ///
    /// Stops when `shutdown` turns true or every sender is dropped.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<Arc<RelayEvent>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => break,
                event = inbound.recv() => {
                    match event {
                        Some(event) => {
                            self.publish(event).await;
                        }
                        None => break,
                    }
                }
            }
        }
        tracing::info!("Broadcast hub stopped");
    }
}
