//! Background maintenance: window rolls and the idle eviction sweep.
//!
//! One task serves the whole registry. Window deadlines are tracked per
//! series, so a fine-grained tick only pays for the series that are
//! actually due; the eviction sweep runs on its own, coarser interval.

use crate::config::RetentionConfig;
use crate::registry::MetricsRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Granularity of the window-roll tick.
const ROLL_TICK: Duration = Duration::from_millis(100);

/// Spawn the maintenance task. Returns its shutdown handle.
pub fn spawn(registry: Arc<MetricsRegistry>, retention: RetentionConfig) -> mpsc::Sender<()> {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        let mut roll_tick = tokio::time::interval(ROLL_TICK);
        let mut sweep_tick = tokio::time::interval(retention.sweep_interval);

        loop {
            tokio::select! {
                _ = roll_tick.tick() => {
                    registry.roll_windows(Instant::now());
                }
                _ = sweep_tick.tick() => {
                    if retention.enabled {
                        registry.sweep_idle(retention.idle_timeout, Instant::now());
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("maintenance task shutting down");
                    break;
                }
            }
        }
    });

    shutdown_tx
}
