//! Signal-driven shutdown.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels `token` on Ctrl-C or, on Unix, on SIGTERM.
///
/// The SIGTERM listener is registered before this returns, so a signal
/// delivered right after the call is not lost. The spawned task also ends
/// when `token` is cancelled by someone else.
///
/// # Errors
///
/// Returns an error if the SIGTERM listener can't be registered.
pub fn install_signal_handlers(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            sigterm.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = token.cancelled() => return,
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    tracing::error!(error = %error, "Failed to listen for Ctrl-C");
                    return;
                }
                tracing::info!(signal = "SIGINT", "Received signal, shutting down");
            }
            () = terminate => {
                tracing::info!(signal = "SIGTERM", "Received signal, shutting down");
            }
        }
        token.cancel();
    }))
}
