//! Connection registry - the authoritative set of open client connections.
//!
//! Each connection owns a bounded outbound queue; the registry stores the
//! sending half. A writer task per connection drains the receiving half into
//! the socket, so nothing in here ever waits on the network.
//!
//! # Thread Safety
//!
//! Membership is a `std::sync::RwLock<HashMap<..>>`. The lock is held only
//! to insert, remove, or copy the member list; broadcasting iterates a copy.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::RelayEvent;

/// Unique identifier for a client connection.
///
/// Generated server-side when a client connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an event could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("delivery timed out")]
    TimedOut,
}

/// Errors that can occur in connection registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("service shutting down")]
    ShuttingDown,
}

/// One live client session.
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<Arc<RelayEvent>>,
    alive: AtomicBool,
    closed: Notify,
}

impl Connection {
    /// Create a connection around the sending half of its outbound queue.
    pub fn new(outbound: mpsc::Sender<Arc<RelayEvent>>) -> Self {
        Self {
            id: ConnectionId::new(),
            outbound,
            alive: AtomicBool::new(true),
            closed: Notify::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Alive and the writer side still holds the queue.
    pub fn is_writable(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Wakes any delivery still waiting for queue space.
    fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
        self.closed.notify_waiters();
    }

    /// Enqueue an event, waiting at most `timeout` for queue space.
    ///
    /// Gives up with `Closed` as soon as the connection is unregistered,
    /// even mid-wait.
    pub async fn deliver(
        &self,
        event: Arc<RelayEvent>,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        // Registered before the alive check so a concurrent mark_dead is not missed.
        let closed = self.closed.notified();
        tokio::pin!(closed);

        if !self.alive.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }

        tokio::select! {
            biased;
            _ = &mut closed => Err(DeliveryError::Closed),
            sent = self.outbound.send_timeout(event, timeout) => sent.map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DeliveryError::TimedOut,
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
            }),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("alive", &self.alive.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Members {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    closed: bool,
}

/// Tracks every open client connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    members: RwLock<Members>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    ///
    /// # Errors
    ///
    /// `RegistryError::ShuttingDown` once [`shutdown`](Self::shutdown) ran.
    pub fn register(&self, connection: Connection) -> Result<ConnectionId, RegistryError> {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        if members.closed {
            return Err(RegistryError::ShuttingDown);
        }
        let id = connection.id();
        members.connections.insert(id, Arc::new(connection));
        tracing::debug!(connection_id = %id, total = members.connections.len(), "Connection registered");
        Ok(id)
    }

    /// Remove a connection.
    ///
    /// Returns `false` if it was already gone, which is not an error: the
    /// writer task and the hub may both detect the same failure.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self
            .members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .connections
            .remove(id);

        match removed {
            Some(connection) => {
                connection.mark_dead();
                tracing::debug!(connection_id = %id, "Connection unregistered");
                true
            }
            None => false,
        }
    }

    /// Number of writable members.
    ///
    /// A member whose writer already dropped its queue is not counted even
    /// if the next broadcast has not removed it yet.
    pub fn count(&self) -> usize {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connections
            .values()
            .filter(|c| c.is_writable())
            .count()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connections
            .contains_key(id)
    }

    /// Copy of the current members, taken under the read lock.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connections
            .values()
            .cloned()
            .collect()
    }

    /// Visit a point-in-time copy of the members without holding the lock.
    pub fn for_each(&self, mut visitor: impl FnMut(&Arc<Connection>)) {
        for connection in self.snapshot() {
            visitor(&connection);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    /// Close every connection and reject later registrations.
    ///
    /// Dropping the registry's queue senders ends each writer task, which
    /// then closes its socket. Returns how many connections were closed.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
            members.closed = true;
            members.connections.drain().map(|(_, c)| c).collect()
        };

        for connection in &drained {
            connection.mark_dead();
        }
        tracing::info!(closed = drained.len(), "Connection registry shut down");
        drained.len()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("count", &self.count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn connection() -> (Connection, mpsc::Receiver<Arc<RelayEvent>>) {
        let (tx, rx) = mpsc::channel(4);
        (Connection::new(tx), rx)
    }

    fn event() -> Arc<RelayEvent> {
        Arc::new(RelayEvent::decode(r#"{"kind":"test","payload":{}}"#).unwrap())
    }

    #[test]
    fn register_increments_count() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = connection();

        let id = registry.register(conn).unwrap();

        assert_eq!(registry.count(), 1);
        assert!(registry.contains(&id));
    }

    #[test]
    fn second_unregister_is_noop() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = connection();
        let (other, _other_rx) = connection();
        let id = registry.register(conn).unwrap();
        registry.register(other).unwrap();

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn count_skips_members_whose_writer_is_gone() {
        let registry = ConnectionRegistry::new();
        let (conn, rx) = connection();
        let (other, _other_rx) = connection();
        registry.register(conn).unwrap();
        registry.register(other).unwrap();

        drop(rx);

        assert_eq!(registry.count(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn for_each_visits_snapshot() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (conn, rx) = connection();
            registry.register(conn).unwrap();
            receivers.push(rx);
        }

        let mut seen = 0;
        registry.for_each(|_| seen += 1);
        assert_eq!(seen, 3);
    }

    #[test]
    fn for_each_tolerates_mutation_from_visitor() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = connection();
        registry.register(conn).unwrap();

        // Would deadlock if the visitor ran under the lock.
        registry.for_each(|c| {
            registry.unregister(&c.id());
        });
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn shutdown_closes_members_and_rejects_new_ones() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = connection();
        registry.register(conn).unwrap();

        assert_eq!(registry.shutdown(), 1);
        assert_eq!(registry.count(), 0);
        assert!(registry.is_closed());

        let (late, _late_rx) = connection();
        let err = registry.register(late).unwrap_err();
        assert_eq!(err, RegistryError::ShuttingDown);
        assert_eq!(err.to_string(), "service shutting down");
    }

    #[tokio::test]
    async fn shutdown_ends_writer_queue() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = connection();
        registry.register(conn).unwrap();

        registry.shutdown();

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn deliver_reports_closed_queue() {
        let (conn, rx) = connection();
        drop(rx);

        let result = conn.deliver(event(), Duration::from_millis(10)).await;
        assert_eq!(result, Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn deliver_times_out_on_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new(tx);

        conn.deliver(event(), Duration::from_millis(10)).await.unwrap();
        let result = conn.deliver(event(), Duration::from_millis(10)).await;
        assert_eq!(result, Err(DeliveryError::TimedOut));
    }

    #[tokio::test]
    async fn deliver_to_unregistered_connection_fails() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = connection();
        let id = registry.register(conn).unwrap();
        let held = registry.snapshot().pop().unwrap();

        registry.unregister(&id);

        let result = held.deliver(event(), Duration::from_millis(10)).await;
        assert_eq!(result, Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn unregister_wakes_delivery_waiting_on_full_queue() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, _rx) = mpsc::channel(1);
        let id = registry.register(Connection::new(tx)).unwrap();
        let held = registry.snapshot().pop().unwrap();
        held.deliver(event(), Duration::from_millis(10)).await.unwrap();

        let remover = {
            let registry = registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                registry.unregister(&id)
            })
        };

        let started = tokio::time::Instant::now();
        let result = held.deliver(event(), Duration::from_secs(5)).await;

        assert_eq!(result, Err(DeliveryError::Closed));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(remover.await.unwrap());
    }

    #[test]
    fn connection_id_display_is_uuid() {
        assert_eq!(ConnectionId::new().to_string().len(), 36);
    }

    proptest! {
        #[test]
        fn count_tracks_registrations_minus_removals(
            n in 0usize..32,
            removals in proptest::collection::vec(any::<prop::sample::Index>(), 0..48),
        ) {
            let registry = ConnectionRegistry::new();
            let mut receivers = Vec::new();
            let mut ids = Vec::new();
            for _ in 0..n {
                let (conn, rx) = connection();
                ids.push(registry.register(conn).unwrap());
                receivers.push(rx);
            }

            let mut removed = std::collections::HashSet::new();
            if !ids.is_empty() {
                for index in removals {
                    let id = ids[index.index(ids.len())];
                    let first_time = removed.insert(id);
                    prop_assert_eq!(registry.unregister(&id), first_time);
                }
            }

            prop_assert_eq!(registry.count(), n - removed.len());
        }
    }
}
