pub mod report;
pub mod setup;
pub mod ui;
pub mod watch;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Token cancelled on Ctrl-C, so an interrupted run still reports what it got.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            signal_token.cancel();
        }
    });
    token
}
