//! Relay lifecycle - builds the components at boot and stops them at exit.
//!
//! ```text
//!  BrokerSubscriber ──► SubscriptionManager ──(mpsc, hub_capacity)──► BroadcastHub
//!                              │ watch<SubscriptionState>                │
//!                              ▼                                         ▼
//!                        HealthReporter ◄──────── count ──────── ConnectionRegistry
//! ```
//!
//! Every component is an owned instance wired here; nothing is global.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::ports::BrokerSubscriber;

use super::backoff::Backoff;
use super::health_reporter::HealthReporter;
use super::hub::BroadcastHub;
use super::registry::ConnectionRegistry;
use super::subscription_manager::SubscriptionManager;

/// Settings each accepted client connection is created with.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub queue_capacity: usize,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

/// Handle to a running relay.
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    reporter: HealthReporter,
    settings: ConnectionSettings,
    shutdown: watch::Sender<bool>,
    subscription_task: JoinHandle<()>,
    hub_task: JoinHandle<()>,
}

impl Relay {
    /// Construct the relay components and spawn the subscription and hub tasks.
    pub fn start(
        config: &RelayConfig,
        service_name: impl Into<String>,
        subscriber: Arc<dyn BrokerSubscriber>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(config.hub_capacity);

        let manager = SubscriptionManager::new(
            subscriber,
            config.channel.clone(),
            events_tx,
            Backoff::new(config.initial_backoff(), config.max_backoff()),
        );
        let reporter = HealthReporter::new(manager.state(), registry.clone(), service_name);

        let hub = BroadcastHub::new(registry.clone(), config.write_timeout());
        let hub_shutdown = shutdown_rx.clone();
        let hub_task = tokio::spawn(async move { hub.run(events_rx, hub_shutdown).await });
        let subscription_task = manager.start(shutdown_rx);

        tracing::info!(channel = %config.channel, "Relay started");

        Self {
            registry,
            reporter,
            settings: ConnectionSettings {
                queue_capacity: config.queue_capacity,
                ping_interval: config.ping_interval(),
                write_timeout: config.write_timeout(),
            },
            shutdown,
            subscription_task,
            hub_task,
        }
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    pub fn health(&self) -> HealthReporter {
        self.reporter.clone()
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        self.settings
    }

    /// Stop the subscription loop and the hub, then close every connection.
    pub async fn shutdown(self) {
        tracing::info!("Relay shutting down");
        self.shutdown.send_replace(true);
        self.registry.shutdown();

        if let Err(e) = self.subscription_task.await {
            tracing::error!(error = %e, "Subscription task ended abnormally");
        }
        if let Err(e) = self.hub_task.await {
            tracing::error!(error = %e, "Broadcast hub task ended abnormally");
        }
        tracing::info!("Relay stopped");
    }
}
