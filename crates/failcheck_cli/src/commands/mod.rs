//! CLI command implementations.

pub mod compare;
pub mod init;
pub mod load;

use std::io;
use tokio_util::sync::CancellationToken;

/// Cancels `token` on SIGINT or SIGTERM.
///
/// The handlers are installed before this returns, so a failure to install
/// them is reported to the caller instead of stopping the run.
#[cfg(unix)]
pub fn cancel_on_signal(token: CancellationToken) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => tracing::info!("interrupt received, shutting down"),
            _ = terminate.recv() => tracing::info!("terminate received, shutting down"),
        }
        token.cancel();
    });
    Ok(())
}

/// Cancels `token` on Ctrl+C.
#[cfg(windows)]
pub fn cancel_on_signal(token: CancellationToken) -> io::Result<()> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    tokio::spawn(async move {
        ctrl_c.recv().await;
        tracing::info!("interrupt received, shutting down");
        token.cancel();
    });
    Ok(())
}
