//! # Background Sync Service
//!
//! Wires the pending store, the coordinator, connectivity and the periodic
//! timer together. Callers enqueue through the service; it replays at once
//! when online and otherwise waits for reconnection or the next tick.
//!
//! ## Architecture
//!
//! - **Coordinator** (`coordinator.rs`): single-flight drain of the log
//! - **Network Monitor** (`network_monitor.rs`): connectivity providers
//! - **Connectivity Observer** (`background.rs`): drains on reconnection
//! - **Scheduler** (`scheduler.rs`): periodic safety-net timer
//! - **Sync State** (`sync_state.rs`): UI-facing status snapshot
//! - **Metrics** (`metrics.rs`): drain counters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use babysync::api::transport::HttpTransport;
//! use babysync::offline::Mutation;
//! use babysync::storage::MemoryStore;
//! use babysync::sync::network_monitor::ManualConnectivity;
//! use babysync::sync::SyncService;
//! use babysync::SyncConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), babysync::SyncError> {
//! let config = SyncConfig::default();
//! let transport = Arc::new(HttpTransport::new(config.request_timeout)?);
//! let connectivity = Arc::new(ManualConnectivity::new(true));
//! let service = SyncService::new(config, Arc::new(MemoryStore::new()), transport, connectivity).await?;
//!
//! service.start().await?;
//! service
//!     .enqueue(Mutation::Create(serde_json::json!({"type": "pipi"})), "/events")
//!     .await?;
//! println!("{:?}", service.status().await);
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod coordinator;
pub mod metrics;
pub mod network_monitor;
pub mod scheduler;
pub mod sync_state;

pub use coordinator::{CoordinatorOptions, DrainOutcome, DrainReport, SyncCoordinator};
pub use metrics::SyncMetrics;
pub use network_monitor::{ConnectionStatus, ConnectivityProvider, ManualConnectivity, ProbeConnectivity};
pub use sync_state::SyncStatus;

use crate::api::transport::Transport;
use crate::offline::queue::{Mutation, PendingStore};
use crate::shared::{SyncConfig, SyncError};
use crate::storage::KeyValueStore;
use background::ConnectivityObserver;
use scheduler::SyncScheduler;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Main sync service coordinator
pub struct SyncService {
    config: SyncConfig,
    store: Arc<PendingStore>,
    coordinator: Arc<SyncCoordinator>,
    connectivity: Arc<dyn ConnectivityProvider>,
    pending_count: watch::Sender<usize>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl SyncService {
    /// Open the pending log and prune entries past the retention window
    pub async fn new(
        config: SyncConfig,
        storage: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn ConnectivityProvider>,
    ) -> Result<Self, SyncError> {
        let store = Arc::new(PendingStore::open(storage, config.storage_key.clone()).await?);

        if let Err(e) = store.prune_older_than(config.retention()).await {
            tracing::warn!(error = %e, "cannot prune old pending operations");
        }

        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            transport,
            CoordinatorOptions {
                base_url: config.api_url.clone(),
                request_timeout: config.request_timeout,
                retry: config.retry_policy(),
                preserve_target_order: config.preserve_target_order,
            },
        ));

        let (pending_count, _) = watch::channel(store.pending_count().await);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            coordinator,
            connectivity,
            pending_count,
            shutdown,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Queue a mutation, replaying at once when online
    ///
    /// Only a local persistence failure is reported; replay failures leave
    /// the entry queued.
    pub async fn enqueue(&self, mutation: Mutation, target: impl Into<String>) -> Result<Uuid, SyncError> {
        let id = self.store.enqueue(mutation, target).await?;

        if self.connectivity.is_online() {
            self.coordinator.drain().await;
        } else {
            tracing::debug!(%id, "offline, operation waits for reconnection");
        }

        self.refresh_pending_count().await;
        Ok(id)
    }

    /// Drain now, whatever the connectivity state says
    pub async fn drain(&self) -> DrainOutcome {
        let outcome = self.coordinator.drain().await;
        self.refresh_pending_count().await;
        outcome
    }

    /// Drop every queued operation
    pub async fn clear_pending(&self) -> Result<(), SyncError> {
        self.store.clear().await?;
        self.refresh_pending_count().await;
        Ok(())
    }

    /// Current status for display
    pub async fn status(&self) -> SyncStatus {
        let connection = self.connectivity.status();
        let metrics = self.coordinator.metrics().await;
        SyncStatus {
            pending_count: self.store.pending_count().await,
            dead_letter_count: self.coordinator.dead_letters().await.len(),
            is_syncing: self.coordinator.is_draining(),
            is_online: connection.online,
            is_slow_connection: connection.slow,
            last_sync_at: metrics.last_clean_drain_at,
        }
    }

    /// Receiver of the pending count, refreshed on enqueue, drain and tick
    pub fn subscribe_pending_count(&self) -> watch::Receiver<usize> {
        self.pending_count.subscribe()
    }

    /// Receiver that flips to `true` when the service shuts down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Spawn the connectivity observer and the periodic scheduler
    pub async fn start(&self) -> Result<(), SyncError> {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return Err(SyncError::validation("service", "background sync is already running"));
        }
        self.shutdown.send_replace(false);

        let observer = ConnectivityObserver::new(
            self.connectivity.subscribe(),
            self.coordinator.clone(),
            self.store.clone(),
            self.pending_count.clone(),
        );
        workers.push(tokio::spawn(observer.run(self.shutdown.subscribe())));

        let scheduler = SyncScheduler::new(
            self.config.sync_interval,
            self.config.drain_on_tick,
            self.store.clone(),
            self.coordinator.clone(),
            self.connectivity.clone(),
            self.pending_count.clone(),
        );
        workers.push(tokio::spawn(scheduler.run(self.shutdown.subscribe())));

        tracing::info!(
            interval_secs = self.config.sync_interval.as_secs(),
            online = self.connectivity.is_online(),
            "background sync started"
        );
        Ok(())
    }

    /// Stop background tasks, letting a running drain finish
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "sync worker ended abnormally");
            }
        }
        tracing::info!("background sync stopped");
    }

    pub fn store(&self) -> &Arc<PendingStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    async fn refresh_pending_count(&self) {
        self.pending_count.send_replace(self.store.pending_count().await);
    }
}
