//! Process startup: tracing, relay wiring, and the HTTP server.

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::adapters::{relay_router, RedisSubscriber};
use crate::application::Relay;
use crate::config::{AppConfig, ConfigError, ValidationError};
use crate::ports::BrokerError;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("broker setup failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Production emits JSON lines.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if config.is_production() {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
}

/// Run the relay until a shutdown signal arrives.
///
/// Failing to bind the listen address is fatal. After the server stops
/// accepting requests the relay is shut down and every connection closed.
pub async fn run(config: AppConfig) -> Result<(), StartupError> {
    config.validate()?;
    let addr = config.server.socket_addr()?;

    let subscriber = Arc::new(RedisSubscriber::new(&config.redis)?);
    let relay = Relay::start(
        &config.relay,
        config.server.service_name.clone(),
        subscriber,
    );
    let app = relay_router(&relay, &config.server.cors_origins_list());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind listen address");
            relay.shutdown().await;
            return Err(e.into());
        }
    };
    tracing::info!(
        addr = %addr,
        channel = %config.relay.channel,
        environment = ?config.server.environment,
        "Notification relay listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    relay.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
