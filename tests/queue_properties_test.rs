//! Property tests for the pending-operation store

use babysync::offline::{Mutation, PendingStore};
use babysync::storage::MemoryStore;
use chrono::{Duration as ChronoDuration, Utc};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn mutation_strategy() -> impl Strategy<Value = (u8, String)> {
    (0u8..3, "[a-z0-9]{1,8}")
}

fn to_mutation(kind: u8, value: &str) -> Mutation {
    match kind {
        0 => Mutation::Create(json!({ "type": "pipi", "notes": value })),
        1 => Mutation::Update(json!({ "notes": value })),
        _ => Mutation::Delete,
    }
}

proptest! {
    #[test]
    fn list_pending_follows_enqueue_order(ops in prop::collection::vec(mutation_strategy(), 0..30)) {
        runtime().block_on(async {
            let store = PendingStore::open(Arc::new(MemoryStore::new()), "pending-sync").await.unwrap();

            let mut expected = Vec::new();
            for (kind, value) in &ops {
                let id = store
                    .enqueue(to_mutation(*kind, value), format!("/events/{}", value))
                    .await
                    .unwrap();
                expected.push(id);
            }

            let listed: Vec<Uuid> = store.list_pending().await.iter().map(|op| op.id).collect();
            prop_assert_eq!(listed, expected);
            Ok(())
        })?;
    }

    #[test]
    fn remove_completed_removes_exactly_the_given_ids(
        count in 1usize..20,
        removed_mask in prop::collection::vec(any::<bool>(), 20),
    ) {
        runtime().block_on(async {
            let store = PendingStore::open(Arc::new(MemoryStore::new()), "pending-sync").await.unwrap();

            let mut ids = Vec::new();
            for i in 0..count {
                ids.push(store.enqueue(Mutation::Delete, format!("/events/{}", i)).await.unwrap());
            }

            let completed: HashSet<Uuid> = ids
                .iter()
                .zip(&removed_mask)
                .filter(|(_, remove)| **remove)
                .map(|(id, _)| *id)
                .collect();
            let removed = store.remove_completed(&completed).await.unwrap();
            prop_assert_eq!(removed, completed.len());

            let survivors: Vec<Uuid> = ids.iter().filter(|id| !completed.contains(id)).copied().collect();
            let listed: Vec<Uuid> = store.list_pending().await.iter().map(|op| op.id).collect();
            prop_assert_eq!(listed, survivors);
            Ok(())
        })?;
    }

    #[test]
    fn prune_keeps_entries_at_or_after_cutoff(offset_secs in -3_600i64..3_600) {
        runtime().block_on(async {
            let store = PendingStore::open(Arc::new(MemoryStore::new()), "pending-sync").await.unwrap();
            store.enqueue(Mutation::Delete, "/events/1").await.unwrap();
            let enqueued_at = store.list_pending().await[0].enqueued_at;

            let cutoff = enqueued_at + ChronoDuration::seconds(offset_secs);
            let pruned = store.prune_before(cutoff).await.unwrap();

            if enqueued_at < cutoff {
                prop_assert_eq!(pruned, 1);
                prop_assert_eq!(store.pending_count().await, 0);
            } else {
                prop_assert_eq!(pruned, 0);
                prop_assert_eq!(store.pending_count().await, 1);
            }
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn prune_older_than_uses_wall_clock() {
    let store = PendingStore::open(Arc::new(MemoryStore::new()), "pending-sync").await.unwrap();
    store.enqueue(Mutation::Delete, "/events/1").await.unwrap();

    assert_eq!(store.prune_older_than(ChronoDuration::days(7)).await.unwrap(), 0);
    assert_eq!(store.prune_before(Utc::now() + ChronoDuration::seconds(1)).await.unwrap(), 1);
}
