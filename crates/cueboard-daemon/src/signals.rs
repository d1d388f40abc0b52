//! Signal handling for graceful shutdown.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `shutdown` when SIGTERM or SIGINT arrives.
pub fn setup_signal_handlers(shutdown: &CancellationToken) {
    // Handle SIGTERM
    let on_term = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM");
                on_term.cancel();
            }
            Err(e) => warn!(error = %e, "Could not install SIGTERM handler"),
        }
    });

    // Handle SIGINT (Ctrl+C)
    let on_int = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT");
            on_int.cancel();
        }
    });
}
