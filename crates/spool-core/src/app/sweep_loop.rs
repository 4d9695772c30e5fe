use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::sweeper::ExpirationSweeper;

/// Background expiration sweep handle.
/// - `request_shutdown()` で次の tick を待たずに止まる（実行中の sweep は最後まで走る）
/// - `shutdown_and_join()` で終了を待てる
pub struct SweepLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweepLoop {
    /// Spawn a task that sweeps every `interval`; the first sweep runs immediately.
    pub fn spawn(sweeper: Arc<ExpirationSweeper>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(sweep_loop(sweeper, interval, shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already have exited
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "sweep loop task panicked");
        }
    }
}

async fn sweep_loop(
    sweeper: Arc<ExpirationSweeper>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender が消えたら止まる
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        if let Err(e) = sweeper.remove_expired().await {
            tracing::error!(error = %e, "expiration sweep failed");
        }
    }

    tracing::debug!("sweep loop stopped");
}
