//! Process termination signals.

use std::io;

/// Resolves on the first Ctrl+C, or SIGTERM on unix.
///
/// A handler that cannot be installed is reported through `on_error` and then
/// never fires; the other one still does.
pub async fn terminated(on_error: impl Fn(&'static str, io::Error)) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            on_error("SIGINT", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                on_error("SIGTERM", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = term => {}
    }
}
