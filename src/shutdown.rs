//! # OS signal handling.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives a
//! termination signal; [`cancel_on_signal`] turns that into a fired
//! [`CancellationToken`] so every component observes one shutdown.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (sent by the orchestrator when it kills a task)
//! - `SIGQUIT`
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => info!(signal = "SIGINT", "shutdown signal received"),
        _ = sigterm.recv() => info!(signal = "SIGTERM", "shutdown signal received"),
        _ = sigquit.recv() => info!(signal = "SIGQUIT", "shutdown signal received"),
    }
    Ok(())
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "ctrl-c", "shutdown signal received");
    Ok(())
}

/// Spawns a task that cancels `token` on the first termination signal.
///
/// The task exits without cancelling if `token` fires first. A failed
/// signal registration cancels the token right away.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = wait_for_shutdown_signal() => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to install signal handlers");
                }
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}
