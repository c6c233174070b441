//! Signal handling for graceful shutdown

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Raise the returned shutdown flag on Ctrl+C or SIGTERM
pub fn setup_signal_handlers() -> Result<watch::Receiver<bool>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Handle Ctrl+C (SIGINT)
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C signal: {}", e);
                return;
            }

            info!("Ctrl+C signal received");
            let _ = shutdown_tx.send(true);
        });
    }

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;

        let term = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, term.clone())
            .context("Failed to register SIGTERM handler")?;

        tokio::spawn(async move {
            while !term.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }

            info!("SIGTERM signal received");
            let _ = shutdown_tx.send(true);
        });
    }

    Ok(shutdown_rx)
}

/// Wait for background tasks to wind down, giving each at most `limit`
pub async fn graceful_shutdown(tasks: Vec<(&'static str, JoinHandle<()>)>, limit: Duration) {
    info!("Starting graceful shutdown...");

    for (name, handle) in tasks {
        match timeout(limit, handle).await {
            Ok(Ok(())) => info!("{} stopped gracefully", name),
            Ok(Err(e)) => error!("{} task failed: {}", name, e),
            Err(_) => warn!("{} did not stop within {:?}, abandoning it", name, limit),
        }
    }

    info!("Graceful shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_graceful_shutdown_waits_for_finished_tasks() {
        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let _ = rx.changed().await;
        });

        tx.send(true).unwrap();
        graceful_shutdown(vec![("waiter", task)], Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_graceful_shutdown_gives_up_on_stuck_tasks() {
        tokio::time::pause();
        let stuck = tokio::spawn(std::future::pending::<()>());
        let start = tokio::time::Instant::now();

        graceful_shutdown(vec![("stuck", stuck)], Duration::from_secs(3)).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
