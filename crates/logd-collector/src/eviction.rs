//! Background eviction task
//!
//! Every `interval`, trims every stored log (registered or not) down to the
//! retention bound. A failed pass is logged and retried on the next tick.

use std::time::Duration;

use logd_storage::{StorageResult, Store};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Trim every log in `store` to the retention bound
///
/// Returns the total number of events removed.
pub(crate) fn evict_all(store: &Store) -> StorageResult<usize> {
    let mut removed = 0;
    for name in store.log_names()? {
        removed += store.log(name).remove_old_events()?;
    }
    Ok(removed)
}

pub(crate) struct EvictionTask {
    store: Store,
    interval: Duration,
    cancel: CancellationToken,
}

impl EvictionTask {
    /// Spawn the task; it exits when `cancel` fires
    pub fn spawn(store: Store, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let task = Self {
            store,
            interval: interval.max(Duration::from_millis(1)),
            cancel,
        };
        tokio::spawn(task.run())
    }

    async fn run(self) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Eviction task started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Eviction task shutting down");
                    break;
                }
                _ = interval.tick() => self.pass().await,
            }
        }
    }

    async fn pass(&self) {
        debug!("Eviction pass starting");
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || evict_all(&store)).await {
            Ok(Ok(removed)) => debug!(removed, "Eviction pass finished"),
            Ok(Err(e)) => warn!(error = %e, "Eviction pass failed"),
            Err(e) => warn!(error = %e, "Eviction pass aborted"),
        }
    }
}
