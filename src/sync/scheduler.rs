//! # Sync Scheduler
//!
//! Periodic safety net against missed connectivity events: every tick
//! refreshes the published pending count and, when enabled and online,
//! runs an opportunistic drain.

use super::coordinator::SyncCoordinator;
use super::network_monitor::ConnectivityProvider;
use crate::offline::queue::PendingStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Synchronization scheduler
pub struct SyncScheduler {
    interval: Duration,
    drain_on_tick: bool,
    store: Arc<PendingStore>,
    coordinator: Arc<SyncCoordinator>,
    connectivity: Arc<dyn ConnectivityProvider>,
    pending_count: watch::Sender<usize>,
}

impl SyncScheduler {
    pub fn new(
        interval: Duration,
        drain_on_tick: bool,
        store: Arc<PendingStore>,
        coordinator: Arc<SyncCoordinator>,
        connectivity: Arc<dyn ConnectivityProvider>,
        pending_count: watch::Sender<usize>,
    ) -> Self {
        Self {
            interval,
            drain_on_tick,
            store,
            coordinator,
            connectivity,
            pending_count,
        }
    }

    /// One timer tick
    pub async fn tick(&self) {
        let pending = self.store.pending_count().await;
        self.pending_count.send_replace(pending);

        if self.drain_on_tick && pending > 0 && self.connectivity.is_online() {
            self.coordinator.drain().await;
            self.pending_count.send_replace(self.store.pending_count().await);
        }
    }

    /// Tick every `interval` until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("sync scheduler stopped");
    }
}
