use notification_relay::bootstrap::{self, StartupError};
use notification_relay::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    bootstrap::init_tracing(&config);

    if let Err(e) = bootstrap::run(config).await {
        tracing::error!(error = %e, "Notification relay exited with error");
        return Err(e);
    }
    Ok(())
}
