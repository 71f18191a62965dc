//! Health reporter - point-in-time relay status.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use crate::domain::{HealthReport, HealthSnapshot, HealthStatus, SubscriptionState};

use super::registry::ConnectionRegistry;

/// Reads subscription state and registry size; never mutates either.
#[derive(Clone)]
pub struct HealthReporter {
    subscription: watch::Receiver<SubscriptionState>,
    registry: Arc<ConnectionRegistry>,
    service_name: String,
}

impl HealthReporter {
    pub fn new(
        subscription: watch::Receiver<SubscriptionState>,
        registry: Arc<ConnectionRegistry>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription,
            registry,
            service_name: service_name.into(),
        }
    }

    /// Healthy iff the upstream subscription is connected. Live connections
    /// are reported either way.
    pub fn snapshot(&self) -> HealthSnapshot {
        let (connected, broker_error) = {
            let state = self.subscription.borrow();
            (state.is_connected(), state.last_error.clone())
        };

        HealthSnapshot {
            status: if connected {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            subscription_connected: connected,
            live_connections: self.registry.count(),
            broker_error,
        }
    }

    /// Full health document, stamped with the current time.
    pub fn report(&self) -> HealthReport {
        self.snapshot().into_report(&self.service_name, Utc::now())
    }
}
