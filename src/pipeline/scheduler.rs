//! Periodic batch scheduler for the review pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use super::processor::ReviewProcessor;

/// Spawn the background sync loop.
///
/// Each tick runs the retry pass for unsent replies, then processes all
/// active accounts. Returns a `JoinHandle` and the shared shutdown flag —
/// set the flag to stop: the loop exits at the next tick and an in-flight
/// batch drains between accounts.
pub fn spawn_sync_loop(
    processor: Arc<ReviewProcessor>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = processor.shutdown_flag();
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Review sync loop started"
        );

        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Review sync loop shutting down");
                return;
            }

            let resent = processor.retry_unsent().await;
            if resent > 0 {
                info!(resent, "Recovered unsent replies");
            }

            processor.process_all_accounts().await;
        }
    });

    (handle, shutdown_flag)
}
