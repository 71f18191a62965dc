//! Relay configuration (channel, queue sizes, timeouts, backoff)

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Relay core configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Broker channel to subscribe to
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Outbound queue capacity per client connection
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of the channel between subscription and hub
    #[serde(default = "default_hub_capacity")]
    pub hub_capacity: usize,

    /// Per-connection delivery timeout in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Interval between server pings to each client, in seconds
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// First reconnect delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Reconnect delay ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl RelayConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Create config with a custom channel name.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Create config with a custom per-connection delivery timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Create config with custom reconnect backoff bounds.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Validate relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.channel.trim().is_empty() {
            return Err(ValidationError::MissingRequired("RELAY__CHANNEL"));
        }
        if self.queue_capacity == 0 || self.hub_capacity == 0 {
            return Err(ValidationError::InvalidCapacity);
        }
        if self.write_timeout_ms == 0 || self.ping_interval_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.initial_backoff_ms == 0 || self.initial_backoff() > self.max_backoff() {
            return Err(ValidationError::InvalidBackoff);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            queue_capacity: default_queue_capacity(),
            hub_capacity: default_hub_capacity(),
            write_timeout_ms: default_write_timeout_ms(),
            ping_interval_secs: default_ping_interval_secs(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_channel() -> String {
    "ticket_events".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_hub_capacity() -> usize {
    256
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

fn default_ping_interval_secs() -> u64 {
    25
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.channel, "ticket_events");
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.initial_backoff(), Duration::from_millis(500));
        assert_eq!(config.max_backoff(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = RelayConfig::default()
            .with_channel("other")
            .with_write_timeout(Duration::from_millis(50))
            .with_backoff(Duration::from_millis(10), Duration::from_secs(2));
        assert_eq!(config.channel, "other");
        assert_eq!(config.write_timeout(), Duration::from_millis(50));
        assert_eq!(config.initial_backoff(), Duration::from_millis(10));
        assert_eq!(config.max_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn test_sub_second_backoff_ceiling_is_kept() {
        let config = RelayConfig::default()
            .with_backoff(Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(config.initial_backoff(), Duration::from_millis(10));
        assert_eq!(config.max_backoff(), Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_channel() {
        let config = RelayConfig::default().with_channel("  ");
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_validation_zero_capacity() {
        let config = RelayConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidCapacity)));
    }

    #[test]
    fn test_validation_backoff_above_ceiling() {
        let config = RelayConfig {
            initial_backoff_ms: 60_000,
            max_backoff_ms: 30_000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidBackoff)));
    }
}
