//! # Connectivity Observer
//!
//! Background task that follows the connectivity channel and drains the
//! pending log once on every offline-to-online transition.

use super::coordinator::{DrainOutcome, SyncCoordinator};
use super::network_monitor::ConnectionStatus;
use crate::offline::queue::PendingStore;
use std::sync::Arc;
use tokio::sync::watch;

/// Drains on reconnection and keeps the published pending count fresh
pub struct ConnectivityObserver {
    connectivity: watch::Receiver<ConnectionStatus>,
    coordinator: Arc<SyncCoordinator>,
    store: Arc<PendingStore>,
    pending_count: watch::Sender<usize>,
    was_online: bool,
}

impl ConnectivityObserver {
    pub fn new(
        connectivity: watch::Receiver<ConnectionStatus>,
        coordinator: Arc<SyncCoordinator>,
        store: Arc<PendingStore>,
        pending_count: watch::Sender<usize>,
    ) -> Self {
        // Captured now so a transition before the task first runs is not lost
        let was_online = connectivity.borrow().online;
        Self {
            connectivity,
            coordinator,
            store,
            pending_count,
            was_online,
        }
    }

    /// Follow connectivity changes until `shutdown` flips to true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut was_online = self.was_online;
        tracing::debug!(online = was_online, "connectivity observer started");

        loop {
            tokio::select! {
                changed = self.connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *self.connectivity.borrow_and_update();
                    if status.online && !was_online {
                        tracing::info!("back online, draining pending operations");
                        if let DrainOutcome::AlreadyRunning = self.coordinator.drain().await {
                            tracing::debug!("reconnection drain coalesced with a running drain");
                        }
                        self.pending_count.send_replace(self.store.pending_count().await);
                    } else if !status.online && was_online {
                        tracing::info!("gone offline, queueing writes");
                    }
                    was_online = status.online;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("connectivity observer stopped");
    }
}
