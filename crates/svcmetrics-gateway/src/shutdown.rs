//! Process shutdown signals.

use std::future::{pending, Future};

/// Future resolving on SIGINT (ctrl-c) or SIGTERM.
///
/// The SIGTERM handler is installed when this is called, not when the
/// future is first polled. A handler that cannot be installed is logged and
/// never fires.
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    #[cfg(unix)]
    let sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            None
        }
    };

    async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to install ctrl-c handler");
                pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match sigterm {
                Some(mut sigterm) => {
                    sigterm.recv().await;
                }
                None => pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        tracing::info!("signal received, starting graceful shutdown");
    }
}
