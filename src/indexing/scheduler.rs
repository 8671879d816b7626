//! Periodic background re-indexing

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::coordinator::IndexingCoordinator;
use crate::errors::VaultdexError;

/// Handle for stopping the scheduler
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop scheduling new passes. A pass already running is not cancelled.
    pub fn shutdown(&self) {
        info!("Stopping re-index scheduler");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the scheduler task to exit
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Run a pass every `period`, starting one period from now.
///
/// A tick that lands while a pass is still running is skipped.
pub fn spawn_scheduler(coordinator: IndexingCoordinator, period: Duration) -> SchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_seconds = period.as_secs(), "Re-index scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match coordinator.start_indexing().await {
                        Ok(pass) => debug!(pass_id = %pass.pass_id, "Scheduled indexing pass started"),
                        Err(VaultdexError::AlreadyRunning { progress_percent }) => {
                            debug!(progress_percent, "Indexing already running; skipping tick");
                        }
                        Err(e) => warn!(error = %e, "Scheduled indexing pass failed to start"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Re-index scheduler stopped");
    });

    SchedulerHandle { shutdown_tx, handle }
}
