//! # Network Monitor
//!
//! Online/offline state and a coarse slow-connection hint, published through
//! a `tokio::sync::watch` channel.
//!
//! Two providers:
//!
//! - [`ManualConnectivity`]: toggled by the caller; the platform shell feeds
//!   it OS connectivity events, tests flip it directly
//! - [`ProbeConnectivity`]: polls the API health endpoint and treats any
//!   HTTP answer as online and a slow round trip as a slow connection

use crate::shared::config::join_url;
use crate::shared::{SyncConfig, SyncError};
use reqwest::Client;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Downlink below this many Mbit/s counts as slow
pub const SLOW_DOWNLINK_MBPS: f64 = 1.5;

/// Current connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub online: bool,
    /// UX hint only, never gates replay
    pub slow: bool,
}

impl ConnectionStatus {
    pub const OFFLINE: Self = Self { online: false, slow: false };

    pub fn online() -> Self {
        Self { online: true, slow: false }
    }
}

/// Effective connection type as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveType {
    Slow2g,
    TwoG,
    ThreeG,
    FourG,
}

impl FromStr for EffectiveType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Ok(Self::Slow2g),
            "2g" => Ok(Self::TwoG),
            "3g" => Ok(Self::ThreeG),
            "4g" => Ok(Self::FourG),
            other => Err(SyncError::validation("effective_type", format!("unknown type '{}'", other))),
        }
    }
}

/// Slow when the link is 2G-class or the downlink is under 1.5 Mbit/s
pub fn is_slow_connection(effective_type: Option<EffectiveType>, downlink_mbps: Option<f64>) -> bool {
    matches!(effective_type, Some(EffectiveType::Slow2g | EffectiveType::TwoG))
        || downlink_mbps.is_some_and(|mbps| mbps < SLOW_DOWNLINK_MBPS)
}

/// Source of connectivity state
pub trait ConnectivityProvider: Send + Sync {
    /// Current state
    fn status(&self) -> ConnectionStatus;

    /// Receiver notified on every change
    fn subscribe(&self) -> watch::Receiver<ConnectionStatus>;

    fn is_online(&self) -> bool {
        self.status().online
    }
}

/// Programmatically driven connectivity
#[derive(Debug)]
pub struct ManualConnectivity {
    tx: watch::Sender<ConnectionStatus>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let initial = if online { ConnectionStatus::online() } else { ConnectionStatus::OFFLINE };
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Report an online/offline transition
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|status| {
            if status.online == online {
                return false;
            }
            status.online = online;
            if !online {
                status.slow = false;
            }
            true
        });
    }

    /// Report link characteristics; only affects the slow hint
    pub fn report_link(&self, effective_type: Option<EffectiveType>, downlink_mbps: Option<f64>) {
        let slow = is_slow_connection(effective_type, downlink_mbps);
        self.tx.send_if_modified(|status| {
            if !status.online || status.slow == slow {
                return false;
            }
            status.slow = slow;
            true
        });
    }
}

impl ConnectivityProvider for ManualConnectivity {
    fn status(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }
}

/// Connectivity derived from periodic health checks
#[derive(Debug)]
pub struct ProbeConnectivity {
    tx: watch::Sender<ConnectionStatus>,
    client: Client,
    health_url: String,
    interval: Duration,
    slow_threshold: Duration,
}

impl ProbeConnectivity {
    /// Build a prober for the configured API; starts out offline
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::network(format!("cannot build HTTP client: {}", e)))?;
        let (tx, _) = watch::channel(ConnectionStatus::OFFLINE);

        Ok(Self {
            tx,
            client,
            health_url: join_url(&config.api_url, &config.probe.health_path),
            interval: config.probe.interval,
            slow_threshold: config.probe.slow_threshold,
        })
    }

    /// Run one health check and publish the result
    pub async fn probe_once(&self) -> ConnectionStatus {
        let started = Instant::now();
        let status = match self.client.get(&self.health_url).send().await {
            Ok(_) => ConnectionStatus {
                online: true,
                slow: started.elapsed() > self.slow_threshold,
            },
            Err(e) => {
                tracing::debug!(url = %self.health_url, error = %e, "health probe failed");
                ConnectionStatus::OFFLINE
            }
        };

        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            tracing::info!(online = status.online, slow = status.slow, "connectivity changed");
        }
        status
    }

    /// Probe every `interval` until `shutdown` flips to true
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.probe_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("connectivity probe stopped");
        })
    }
}

impl ConnectivityProvider for ProbeConnectivity {
    fn status(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }
}
