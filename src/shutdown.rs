use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a SIGTERM/SIGINT handler.
///
/// The returned token is cancelled on the first signal. The dispatcher
/// stops pulling new jobs once the token is cancelled and drains the work
/// already in flight before shutting the workers down.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, draining in-flight jobs");
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, draining in-flight jobs");
            }
        }

        handler_token.cancel();
    });

    token
}
