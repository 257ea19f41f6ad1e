//! Common test utilities and helpers
//!
//! Shared fixtures for the integration tests: configuration pointing at a
//! mock API, service construction and polling helpers.

#![allow(dead_code)]

use babysync::api::HttpTransport;
use babysync::storage::{KeyValueStore, MemoryStore};
use babysync::sync::{ManualConnectivity, SyncService};
use babysync::SyncConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Configuration whose API lives under `<server_uri>/api`
pub fn config_for(server_uri: &str) -> SyncConfig {
    SyncConfig::builder()
        .api_url(format!("{}/api", server_uri))
        .request_timeout(Duration::from_secs(2))
        .sync_interval(Duration::from_secs(3600))
        .build()
        .expect("test config is valid")
}

/// Service backed by in-memory storage and a manual connectivity switch
pub async fn service_for(
    config: SyncConfig,
    online: bool,
) -> (Arc<SyncService>, Arc<ManualConnectivity>) {
    service_with_storage(config, Arc::new(MemoryStore::new()), online).await
}

pub async fn service_with_storage(
    config: SyncConfig,
    storage: Arc<dyn KeyValueStore>,
    online: bool,
) -> (Arc<SyncService>, Arc<ManualConnectivity>) {
    let transport = Arc::new(HttpTransport::new(config.request_timeout).expect("client builds"));
    let connectivity = Arc::new(ManualConnectivity::new(online));
    let service = SyncService::new(config, storage, transport, connectivity.clone())
        .await
        .expect("service opens");
    (Arc::new(service), connectivity)
}

/// Poll `check` every 10 ms for up to two seconds
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
