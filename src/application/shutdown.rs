//! Shutdown signal shared by the long-running relay tasks.

use tokio::sync::watch;

/// Resolves once shutdown is requested or its sender is gone.
pub(super) async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
