//! Host cancellation.
//!
//! The provider host cancels in-flight work on SIGINT/SIGTERM. Every
//! long-running operation takes a [`CancellationToken`] and stops waiting as
//! soon as it fires.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel `token` when the process receives Ctrl+C or SIGTERM.
pub fn install_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, cancelling in-flight operations...");
                ctrl_c_token.cancel();
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C signal: {}", e);
            }
        }
    });

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        let term_token = token;
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, cancelling in-flight operations...");
                    term_token.cancel();
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                }
            }
        });
    }
}

/// Run `fut` unless `token` is cancelled first.
pub async fn run_until_cancelled<F, T>(token: &CancellationToken, fut: F) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        value = fut => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_install_does_not_cancel() {
        let token = CancellationToken::new();
        install_signal_handlers(token.clone());
        tokio::task::yield_now().await;
        assert!(!token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled() {
        let token = CancellationToken::new();
        assert_eq!(run_until_cancelled(&token, async { 7 }).await, Some(7));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let never = tokio::time::sleep(Duration::from_secs(3600));
        assert_eq!(run_until_cancelled(&token, never).await, None);
    }
}
