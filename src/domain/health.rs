//! Health snapshot and the status document served by `GET /health`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Overall relay health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub subscription_connected: bool,
    pub live_connections: usize,
    /// Why the subscription is down, if it is.
    pub broker_error: Option<String>,
}

impl HealthSnapshot {
    /// Render the snapshot as the health endpoint's response body.
    pub fn into_report(self, service: &str, now: DateTime<Utc>) -> HealthReport {
        let broker = if self.subscription_connected {
            CHECK_HEALTHY.to_string()
        } else {
            let reason = self.broker_error.as_deref().unwrap_or("not connected");
            format!("unhealthy: {}", reason)
        };

        HealthReport {
            status: self.status,
            service: service.to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            checks: HealthChecks {
                broker,
                transport: CHECK_HEALTHY.to_string(),
            },
            connected_clients: self.live_connections,
        }
    }
}

const CHECK_HEALTHY: &str = "healthy";

/// Body of the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub service: String,
    pub timestamp: String,
    pub checks: HealthChecks,
    pub connected_clients: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub broker: String,
    pub transport: String,
}
