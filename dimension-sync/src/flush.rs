use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tracing::info;

use crate::engine::SyncEngine;
use crate::metrics_consts::FLUSH_CYCLES;

/// Periodic drain of the pending notification set. Runs until the shutdown
/// signal flips; the signal is only observed between cycles, so an
/// in-flight publish batch always completes.
pub async fn flush_loop(
    engine: Arc<SyncEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.flush_pending().await;
                counter!(FLUSH_CYCLES).increment(1);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("flush loop stopping");
                    return;
                }
            }
        }
    }
}
