//! Shutdown signal handling for the world server.
//!
//! The scheduler only stops between ticks, so the binary parks on
//! [`wait_for_shutdown`] and then drives `WorldCore::shutdown` itself.

use tokio::signal;
use tracing::info;

/// Waits for the first termination signal.
///
/// # Platform Support
///
/// * **Unix platforms**: SIGINT and SIGTERM
/// * **Windows**: Ctrl+C
///
/// # Errors
///
/// Fails only if a signal listener cannot be registered, in which case the
/// caller should stop the world right away instead of running unattended.
///
/// # Example
///
/// ```rust,ignore
/// core.start();
/// signals::wait_for_shutdown().await?;
/// core.shutdown().await;
/// ```
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}
