/**
 * babysync agent
 *
 * Runs the offline write-queue in the background: opens the SQLite queue,
 * prunes stale entries, probes the API for connectivity and replays pending
 * operations until Ctrl-C.
 *
 * Usage: babysync-agent [CONFIG.toml]
 */

use babysync::api::HttpTransport;
use babysync::storage::SqliteStore;
use babysync::sync::{ProbeConnectivity, SyncService};
use babysync::SyncConfig;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SyncConfig::load(config_path.as_deref())?;
    tracing::info!(api = %config.api_url, db = %config.db_path.display(), "starting babysync agent");

    let storage = Arc::new(SqliteStore::open(&config.db_path).await?);
    let transport = Arc::new(HttpTransport::new(config.request_timeout)?);
    let connectivity = Arc::new(ProbeConnectivity::new(&config)?);

    // Learn the initial state before the first drain decision
    connectivity.probe_once().await;

    let service = SyncService::new(config, storage.clone(), transport, connectivity.clone()).await?;
    let prober = connectivity.spawn(service.shutdown_signal());
    service.start().await?;

    let status = service.status().await;
    tracing::info!(
        pending = status.pending_count,
        online = status.is_online,
        "queue ready"
    );

    let mut pending = service.subscribe_pending_count();
    loop {
        tokio::select! {
            changed = pending.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *pending.borrow_and_update();
                tracing::info!(pending = count, "pending operations");
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "cannot listen for Ctrl-C");
                }
                break;
            }
        }
    }

    tracing::info!("shutting down");
    service.shutdown().await;
    prober.await?;
    storage.close().await;
    Ok(())
}
