//! Signal handling for graceful engine shutdown.
//!
//! This module provides cross-platform signal handling so the engine can shut
//! down gracefully when receiving termination signals: timers get cancelled
//! and plugins are walked back through stop and dispose before the process
//! exits.

use tokio::signal;
use tracing::info;

/// Waits for a shutdown signal.
///
/// Listens for termination signals (SIGINT and SIGTERM on Unix; Ctrl+C on
/// Windows) and returns when one is received.
pub async fn wait_for_shutdown() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    info!("📡 Received shutdown signal - initiating graceful shutdown");
    Ok(())
}
