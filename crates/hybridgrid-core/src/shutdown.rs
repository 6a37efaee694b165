//! Graceful shutdown (§4.16): cancel on SIGINT/SIGTERM and bound how long
//! in-flight work is given to drain before the process exits anyway.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// In-flight compiles and worker connections get this long to finish after
/// a shutdown signal before the caller should give up waiting.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait for SIGINT or (on unix) SIGTERM, then cancel `token`. Runs until
/// the process receives a signal; intended to be spawned alongside the
/// coordinator/worker's main run loop.
pub async fn wait_for_signal(token: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    token.cancel();
}

/// Run `task` to completion, but don't wait longer than [`DRAIN_TIMEOUT`]
/// once `token` is cancelled.
pub async fn with_drain_timeout<F>(token: CancellationToken, task: F)
where
    F: std::future::Future<Output = ()>,
{
    tokio::pin!(task);
    tokio::select! {
        _ = &mut task => {}
        _ = token.cancelled() => {
            if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
                warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "drain timeout exceeded, exiting anyway");
            }
        }
    }
}
