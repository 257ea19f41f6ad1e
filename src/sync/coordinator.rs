//! # Sync Coordinator
//!
//! Replays the pending log against the remote API, one entry at a time in
//! enqueue order. Each entry succeeds or fails on its own; successes are
//! removed from the store in one batch at the end of the drain, failures
//! stay queued for the next trigger.
//!
//! Only one drain runs at a time. A call that arrives while another drain is
//! in flight returns [`DrainOutcome::AlreadyRunning`] without touching the
//! network.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use babysync::sync::coordinator::{DrainOutcome, SyncCoordinator};
//!
//! # async fn example(coordinator: SyncCoordinator) {
//! match coordinator.drain().await {
//!     DrainOutcome::Completed(report) => println!("{} synced", report.succeeded),
//!     DrainOutcome::NothingPending | DrainOutcome::AlreadyRunning => {}
//! }
//! # }
//! ```

use crate::api::transport::{translate, Transport};
use crate::offline::queue::{OperationKind, PendingOperation, PendingStore};
use crate::offline::retry::{RetryDecision, RetryPolicy};
use crate::shared::SyncError;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::metrics::SyncMetrics;

/// Per-drain tally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries sent to the transport (or rejected by translation)
    pub attempted: usize,
    /// Entries confirmed and removed
    pub succeeded: usize,
    /// Entries that failed and stay queued
    pub failed: usize,
    /// Entries held back by backoff or by an earlier failure on their target
    pub deferred: usize,
    /// Entries past the attempt budget
    pub dead_lettered: usize,
}

/// Result of a drain request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The log was empty
    NothingPending,
    /// Another drain was in flight; nothing was sent
    AlreadyRunning,
    /// The drain ran to completion
    Completed(DrainReport),
}

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Base URL targets are resolved against
    pub base_url: String,
    /// Upper bound for one replayed request
    pub request_timeout: Duration,
    /// Dead-letter threshold and backoff
    pub retry: RetryPolicy,
    /// Defer later entries of a target after one of its entries failed
    pub preserve_target_order: bool,
}

/// Drives best-effort, at-least-once replay of the pending log
pub struct SyncCoordinator {
    store: Arc<PendingStore>,
    transport: Arc<dyn Transport>,
    options: CoordinatorOptions,
    draining: AtomicBool,
    metrics: RwLock<SyncMetrics>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("options", &self.options)
            .field("draining", &self.draining)
            .finish_non_exhaustive()
    }
}

/// Clears the single-flight flag when the drain ends, however it ends
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncCoordinator {
    pub fn new(store: Arc<PendingStore>, transport: Arc<dyn Transport>, options: CoordinatorOptions) -> Self {
        Self {
            store,
            transport,
            options,
            draining: AtomicBool::new(false),
            metrics: RwLock::new(SyncMetrics::new()),
        }
    }

    /// Whether a drain is in flight
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Snapshot of the drain counters
    pub async fn metrics(&self) -> SyncMetrics {
        self.metrics.read().await.clone()
    }

    /// Entries that exhausted the attempt budget
    pub async fn dead_letters(&self) -> Vec<PendingOperation> {
        self.store
            .list_pending()
            .await
            .into_iter()
            .filter(|op| self.options.retry.is_dead_letter(op))
            .collect()
    }

    /// Replay every pending entry once
    ///
    /// Never fails as a whole: per-entry errors are logged and the entry
    /// stays queued.
    pub async fn drain(&self) -> DrainOutcome {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!("drain already in progress, skipping");
            return DrainOutcome::AlreadyRunning;
        };

        let pending = self.store.list_pending().await;
        if pending.is_empty() {
            return DrainOutcome::NothingPending;
        }

        tracing::info!(entries = pending.len(), "draining pending operations");
        let started = Instant::now();
        let now = Utc::now();

        let mut report = DrainReport::default();
        let mut succeeded: HashSet<Uuid> = HashSet::new();
        let mut failed: HashSet<Uuid> = HashSet::new();
        let mut blocked: HashSet<String> = HashSet::new();

        for op in &pending {
            let keys = ordering_keys(op);

            if self.options.preserve_target_order && keys.iter().any(|key| blocked.contains(key)) {
                tracing::debug!(id = %op.id, target = %op.target, "deferred behind an earlier entry on the same resource");
                report.deferred += 1;
                blocked.extend(keys);
                continue;
            }

            match self.options.retry.decide(op, now) {
                RetryDecision::Ready => {}
                RetryDecision::Backoff { until } => {
                    tracing::debug!(id = %op.id, %until, "entry backing off");
                    report.deferred += 1;
                    blocked.extend(keys);
                    continue;
                }
                RetryDecision::DeadLetter => {
                    report.dead_lettered += 1;
                    blocked.extend(keys);
                    continue;
                }
            }

            report.attempted += 1;
            match self.replay(op).await {
                Ok(()) => {
                    tracing::debug!(id = %op.id, kind = op.kind.method(), target = %op.target, "sync succeeded");
                    succeeded.insert(op.id);
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(id = %op.id, target = %op.target, error = %e, "sync failed, kept for retry");
                    } else {
                        tracing::error!(id = %op.id, target = %op.target, error = %e, "cannot replay entry, left in place");
                    }
                    failed.insert(op.id);
                    blocked.extend(keys);
                }
            }
        }

        report.succeeded = succeeded.len();
        report.failed = failed.len();

        if let Err(e) = self.store.remove_completed(&succeeded).await {
            // The entries will be replayed again; the API sees them twice.
            tracing::error!(error = %e, count = succeeded.len(), "cannot remove synced entries");
        }
        if let Err(e) = self.store.record_failures(&failed, Utc::now()).await {
            tracing::warn!(error = %e, "cannot record failed attempts");
        }

        let elapsed = started.elapsed();
        self.metrics.write().await.record_drain(&report, elapsed, Utc::now());

        if report.dead_lettered > 0 {
            tracing::warn!(dead_lettered = report.dead_lettered, "entries past their attempt budget");
        }
        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            deferred = report.deferred,
            elapsed_ms = elapsed.as_millis() as u64,
            "drain finished"
        );

        DrainOutcome::Completed(report)
    }

    async fn replay(&self, op: &PendingOperation) -> Result<(), SyncError> {
        let request = translate(op, &self.options.base_url)?;
        let timeout = self.options.request_timeout;

        match tokio::time::timeout(timeout, self.transport.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                millis: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Resources an entry touches, for the ordering guard
///
/// Every entry touches its target. A Create posted to a collection also
/// touches `<collection>/<id>` when its body carries an `id`, so later
/// writes to that item wait behind it.
fn ordering_keys(op: &PendingOperation) -> Vec<String> {
    let mut keys = vec![op.target.clone()];
    if op.kind == OperationKind::Create {
        let id = match op.payload.as_ref().and_then(|body| body.get("id")) {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        if let Some(id) = id {
            keys.push(format!("{}/{}", op.target.trim_end_matches('/'), id));
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::ReplayRequest;
    use crate::offline::queue::Mutation;
    use crate::storage::{KeyValueStore, MemoryStore};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers from a per-path script, defaulting to success
    #[derive(Default)]
    struct ScriptedTransport {
        failing_paths: Mutex<HashSet<String>>,
        calls: Mutex<Vec<(OperationKind, String)>>,
        delay: Option<Duration>,
    }

    impl ScriptedTransport {
        fn failing(paths: &[&str]) -> Self {
            Self {
                failing_paths: Mutex::new(paths.iter().map(|p| p.to_string()).collect()),
                ..Default::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(OperationKind, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &ReplayRequest) -> Result<(), SyncError> {
            let path = request.url.path().to_string();
            self.calls.lock().unwrap().push((request.kind, path.clone()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing_paths.lock().unwrap().contains(&path) {
                return Err(SyncError::HttpStatus { status: 500 });
            }
            Ok(())
        }
    }

    fn options() -> CoordinatorOptions {
        CoordinatorOptions {
            base_url: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            preserve_target_order: true,
        }
    }

    async fn setup(transport: Arc<ScriptedTransport>, options: CoordinatorOptions) -> (Arc<PendingStore>, SyncCoordinator) {
        let store = Arc::new(PendingStore::open(Arc::new(MemoryStore::new()), "pending-sync").await.unwrap());
        let coordinator = SyncCoordinator::new(store.clone(), transport, options);
        (store, coordinator)
    }

    #[tokio::test]
    async fn test_empty_log() {
        let transport = Arc::new(ScriptedTransport::default());
        let (_, coordinator) = setup(transport.clone(), options()).await;

        assert_eq!(coordinator.drain().await, DrainOutcome::NothingPending);
        assert!(transport.calls().is_empty());
        assert!(!coordinator.is_draining());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_only_failed_entry() {
        let transport = Arc::new(ScriptedTransport::failing(&["/events/2"]));
        let (store, coordinator) = setup(transport.clone(), options()).await;

        let a = store.enqueue(Mutation::Delete, "/events/1").await.unwrap();
        let b = store.enqueue(Mutation::Delete, "/events/2").await.unwrap();
        let c = store.enqueue(Mutation::Delete, "/events/3").await.unwrap();
        let b_enqueued_at = store.list_pending().await[1].enqueued_at;

        let outcome = coordinator.drain().await;
        assert_matches!(outcome, DrainOutcome::Completed(DrainReport { attempted: 3, succeeded: 2, failed: 1, .. }));

        let remaining = store.list_pending().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b);
        assert_eq!(remaining[0].enqueued_at, b_enqueued_at);
        assert_eq!(remaining[0].attempts, 1);
        assert!(!remaining.iter().any(|op| op.id == a || op.id == c));
    }

    #[tokio::test]
    async fn test_replays_in_enqueue_order_with_verbs() {
        let transport = Arc::new(ScriptedTransport::default());
        let (store, coordinator) = setup(transport.clone(), options()).await;

        store.enqueue(Mutation::Create(json!({"type": "pipi"})), "/events").await.unwrap();
        store.enqueue(Mutation::Update(json!({"notes": "x"})), "/events/5").await.unwrap();
        store.enqueue(Mutation::Delete, "/events/5").await.unwrap();

        coordinator.drain().await;

        assert_eq!(
            transport.calls(),
            vec![
                (OperationKind::Create, "/events".to_string()),
                (OperationKind::Update, "/events/5".to_string()),
                (OperationKind::Delete, "/events/5".to_string()),
            ]
        );
        assert_eq!(store.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_update_holds_back_delete_on_same_target() {
        let transport = Arc::new(ScriptedTransport::failing(&["/events/5"]));
        let (store, coordinator) = setup(transport.clone(), options()).await;

        store.enqueue(Mutation::Update(json!({"notes": "x"})), "/events/5").await.unwrap();
        store.enqueue(Mutation::Delete, "/events/5").await.unwrap();
        store.enqueue(Mutation::Delete, "/events/6").await.unwrap();

        let outcome = coordinator.drain().await;
        assert_matches!(outcome, DrainOutcome::Completed(DrainReport { attempted: 2, succeeded: 1, failed: 1, deferred: 1, .. }));

        // The Delete on /events/5 was never sent
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(store.pending_count().await, 2);
    }

    #[tokio::test]
    async fn test_failed_create_holds_back_delete_of_same_item() {
        let transport = Arc::new(ScriptedTransport::failing(&["/events"]));
        let (store, coordinator) = setup(transport.clone(), options()).await;

        store.enqueue(Mutation::Create(json!({"id": "d9d7", "type": "pipi"})), "/events").await.unwrap();
        store.enqueue(Mutation::Delete, "/events/d9d7").await.unwrap();

        let outcome = coordinator.drain().await;
        assert_matches!(outcome, DrainOutcome::Completed(DrainReport { attempted: 1, failed: 1, deferred: 1, .. }));
        assert_eq!(transport.calls(), vec![(OperationKind::Create, "/events".to_string())]);

        transport.failing_paths.lock().unwrap().clear();
        coordinator.drain().await;

        assert_eq!(
            transport.calls(),
            vec![
                (OperationKind::Create, "/events".to_string()),
                (OperationKind::Create, "/events".to_string()),
                (OperationKind::Delete, "/events/d9d7".to_string()),
            ]
        );
        assert_eq!(store.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_deferred_create_also_holds_back_its_item() {
        let transport = Arc::new(ScriptedTransport::failing(&["/events"]));
        let (store, coordinator) = setup(transport.clone(), options()).await;

        store.enqueue(Mutation::Create(json!({"id": "a", "type": "bain"})), "/events").await.unwrap();
        store.enqueue(Mutation::Create(json!({"id": 7, "type": "dodo"})), "/events").await.unwrap();
        store.enqueue(Mutation::Update(json!({"notes": "x"})), "/events/7").await.unwrap();
        store.enqueue(Mutation::Delete, "/events/8").await.unwrap();

        let outcome = coordinator.drain().await;
        assert_matches!(outcome, DrainOutcome::Completed(DrainReport { attempted: 2, succeeded: 1, failed: 1, deferred: 2, .. }));
        assert_eq!(
            transport.calls(),
            vec![
                (OperationKind::Create, "/events".to_string()),
                (OperationKind::Delete, "/events/8".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_independent_targets_without_ordering_guard() {
        let transport = Arc::new(ScriptedTransport::failing(&["/events/5"]));
        let mut opts = options();
        opts.preserve_target_order = false;
        let (store, coordinator) = setup(transport.clone(), opts).await;

        store.enqueue(Mutation::Update(json!({"notes": "x"})), "/events/5").await.unwrap();
        store.enqueue(Mutation::Delete, "/events/5").await.unwrap();

        coordinator.drain().await;
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_drains_are_single_flight() {
        let transport = Arc::new(ScriptedTransport::slow(Duration::from_millis(20)));
        let (store, coordinator) = setup(transport.clone(), options()).await;

        store.enqueue(Mutation::Delete, "/events/1").await.unwrap();
        store.enqueue(Mutation::Delete, "/events/2").await.unwrap();

        let (first, second) = tokio::join!(coordinator.drain(), coordinator.drain());

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|o| **o == DrainOutcome::AlreadyRunning).count(), 1);
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(store.pending_count().await, 0);
        assert!(!coordinator.is_draining());
    }

    #[tokio::test]
    async fn test_timeout_marks_entry_failed() {
        let transport = Arc::new(ScriptedTransport::slow(Duration::from_millis(200)));
        let mut opts = options();
        opts.request_timeout = Duration::from_millis(10);
        let (store, coordinator) = setup(transport, opts).await;

        store.enqueue(Mutation::Delete, "/events/1").await.unwrap();

        let outcome = coordinator.drain().await;
        assert_matches!(outcome, DrainOutcome::Completed(DrainReport { failed: 1, .. }));
        assert_eq!(store.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_entry_stays_queued() {
        let storage = Arc::new(MemoryStore::new());
        storage
            .set(
                "pending-sync",
                &json!([{"id": Uuid::new_v4(), "kind": "CREATE", "target": "/events", "enqueuedAt": Utc::now().timestamp_millis()}]).to_string(),
            )
            .await
            .unwrap();
        let store = Arc::new(PendingStore::open(storage, "pending-sync").await.unwrap());
        let transport = Arc::new(ScriptedTransport::default());
        let coordinator = SyncCoordinator::new(store.clone(), transport.clone(), options());

        let outcome = coordinator.drain().await;
        assert_matches!(outcome, DrainOutcome::Completed(DrainReport { attempted: 1, failed: 1, .. }));
        assert!(transport.calls().is_empty());
        assert_eq!(store.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_dead_letter_threshold() {
        let transport = Arc::new(ScriptedTransport::failing(&["/events/1"]));
        let mut opts = options();
        opts.retry = RetryPolicy::default().with_max_attempts(2);
        let (store, coordinator) = setup(transport.clone(), opts).await;

        store.enqueue(Mutation::Delete, "/events/1").await.unwrap();

        coordinator.drain().await;
        coordinator.drain().await;
        let third = coordinator.drain().await;

        assert_matches!(third, DrainOutcome::Completed(DrainReport { attempted: 0, dead_lettered: 1, .. }));
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(coordinator.dead_letters().await.len(), 1);
        // Still in the log until retention pruning
        assert_eq!(store.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_metrics_after_drain() {
        let transport = Arc::new(ScriptedTransport::failing(&["/events/2"]));
        let (store, coordinator) = setup(transport, options()).await;
        store.enqueue(Mutation::Delete, "/events/1").await.unwrap();
        store.enqueue(Mutation::Delete, "/events/2").await.unwrap();

        coordinator.drain().await;

        let metrics = coordinator.metrics().await;
        assert_eq!(metrics.total_drains, 1);
        assert_eq!(metrics.entries_succeeded, 1);
        assert_eq!(metrics.entries_failed, 1);
        assert!(metrics.last_drain_at.is_some());
    }
}
