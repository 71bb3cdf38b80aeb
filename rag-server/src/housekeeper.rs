//! Background maintenance (§5): three periodic sweeps kept outside the
//! request path so no chat request ever pays for cache or store cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::core::Core;

const MINUTE_TICK: Duration = Duration::from_secs(60);
const FIVE_MINUTE_TICK: Duration = Duration::from_secs(300);

/// Spawn the housekeeping tasks described in §5 and return their handles
/// so the caller can abort them on shutdown.
pub fn spawn(core: Arc<Core>) -> Vec<JoinHandle<()>> {
    vec![spawn_minute_sweep(core.clone()), spawn_five_minute_sweep(core)]
}

fn spawn_minute_sweep(core: Arc<Core>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(MINUTE_TICK);
        loop {
            ticker.tick().await;
            core.run_minute_housekeeping().await;
        }
    })
}

fn spawn_five_minute_sweep(core: Arc<Core>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(FIVE_MINUTE_TICK);
        loop {
            ticker.tick().await;
            core.run_five_minute_housekeeping().await;
        }
    })
}
