use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Waits for ctrl-c, or SIGTERM on unix, then cancels `cancelation`.
///
/// On Windows detached processes can't receive console signals, there `stop` terminates the
/// process instead and the loop relies on atomic writes to leave consistent files behind.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for ctrl-c {e:?}");
                return;
            }
            info!("Received ctrl-c");
        },
        _ = terminate_signal() => {
            info!("Received termination signal");
        },
    };
    cancelation.cancel();
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!("Failed to listen for SIGTERM {e:?}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
