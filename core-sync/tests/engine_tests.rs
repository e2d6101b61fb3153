mod common;

use std::path::PathBuf;
use std::time::Duration;

use bridge_traits::download::reason;
use bridge_traits::{Locator, RecordId, RecordStatus};
use common::{meta, successful, Harness};
use core_runtime::events::{CacheEvent, RemovalCause};
use core_sync::{CacheState, DownloadError, SyncError, SyncState};

#[tokio::test]
async fn test_no_record_is_not_cached() {
    let harness = Harness::new();

    let state = harness.engine.get_cache_state(&meta("A", "u1")).await.unwrap();

    assert_eq!(state, CacheState::not_cached(meta("A", "u1")));
}

#[tokio::test]
async fn test_successful_record_is_cached_at_local_locator() {
    let harness = Harness::new();
    harness.subsystem.add_record(1, "u1", successful("file://x/A")).await;

    let state = harness.engine.get_cache_state(&meta("A", "u1")).await.unwrap();

    assert_eq!(
        state,
        CacheState::Cached {
            metadata: meta("A", "u1"),
            file: PathBuf::from("x/A"),
        }
    );
    assert!(harness.subsystem.removed().await.is_empty());
}

#[tokio::test]
async fn test_failed_record_translates_reason_and_is_removed() {
    let mut harness = Harness::new();
    harness
        .subsystem
        .add_record(
            4,
            "u1",
            RecordStatus::Failed {
                error_code: reason::ERROR_INSUFFICIENT_SPACE,
            },
        )
        .await;

    let state = harness.engine.get_cache_state(&meta("A", "u1")).await.unwrap();

    assert_eq!(
        state,
        CacheState::Error {
            metadata: meta("A", "u1"),
            reason: DownloadError::InsufficientSpace,
        }
    );
    assert_eq!(harness.subsystem.removed().await, vec![RecordId(4)]);
    assert!(harness.drain_events().contains(&CacheEvent::RecordRemoved {
        record_id: 4,
        cause: RemovalCause::ConsumedFailure,
    }));
}

#[tokio::test]
async fn test_synchronize_removes_only_orphans() {
    let harness = Harness::new();
    harness.subsystem.add_record(1, "u2", RecordStatus::Running).await;

    let snapshot = harness.engine.synchronize(&[meta("A", "u1")]).await.unwrap();

    assert_eq!(harness.subsystem.removed().await, vec![RecordId(1)]);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(
        snapshot.get(&meta("A", "u1")),
        Some(&CacheState::not_cached(meta("A", "u1")))
    );
}

#[tokio::test]
async fn test_synchronize_never_removes_matched_records() {
    let harness = Harness::new();
    harness.subsystem.add_record(1, "u1", RecordStatus::Running).await;
    harness.subsystem.add_record(2, "u2", successful("file://x/B")).await;
    harness.subsystem.add_record(3, "u3", RecordStatus::Paused).await;
    harness.subsystem.add_record(4, "u9", successful("file://x/Z")).await;

    let snapshot = harness
        .engine
        .synchronize(&[meta("A", "u1"), meta("B", "u2"), meta("C", "u3")])
        .await
        .unwrap();

    assert_eq!(harness.subsystem.removed().await, vec![RecordId(4)]);
    let kinds: Vec<_> = snapshot.states().map(CacheState::kind).collect();
    assert_eq!(kinds, vec!["downloading", "cached", "downloading"]);
}

#[tokio::test]
async fn test_synchronize_is_idempotent() {
    let harness = Harness::new();
    harness.subsystem.add_record(1, "u1", successful("file://x/A")).await;
    harness.subsystem.add_record(2, "u2", RecordStatus::Pending).await;
    harness.subsystem.add_record(3, "u7", RecordStatus::Running).await;
    let metadata = [meta("A", "u1"), meta("B", "u2")];

    let first = harness.engine.synchronize(&metadata).await.unwrap();
    let removed_after_first = harness.subsystem.removed().await;
    let second = harness.engine.synchronize(&metadata).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(removed_after_first, vec![RecordId(3)]);
    assert_eq!(harness.subsystem.removed().await, removed_after_first);
}

#[tokio::test]
async fn test_synchronize_prefers_most_recent_record() {
    let harness = Harness::new();
    harness.subsystem.add_record(2, "u1", successful("file://x/old")).await;
    harness.subsystem.add_record(5, "u1", RecordStatus::Running).await;

    let snapshot = harness.engine.synchronize(&[meta("A", "u1")]).await.unwrap();

    assert_eq!(
        snapshot.get(&meta("A", "u1")),
        Some(&CacheState::downloading(meta("A", "u1")))
    );
    assert!(harness.subsystem.removed().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_locators_keep_first_declaration() {
    let harness = Harness::new();

    let snapshot = harness
        .engine
        .synchronize(&[meta("A", "u1"), meta("B", "u2"), meta("A-copy", "u1")])
        .await
        .unwrap();

    let names: Vec<_> = snapshot.states().map(|s| s.metadata().name.clone()).collect();
    assert_eq!(names, vec!["A", "B"]);
}

#[tokio::test]
async fn test_failed_cleanup_does_not_fail_synchronize() {
    let mut harness = Harness::new();
    let orphan = harness.subsystem.add_record(1, "u2", RecordStatus::Running).await;
    harness.subsystem.fail_removal_of(orphan).await;

    let snapshot = harness.engine.synchronize(&[meta("A", "u1")]).await.unwrap();

    assert_eq!(snapshot.len(), 1);
    assert!(harness.subsystem.removed().await.is_empty());
    assert!(harness.drain_events().iter().any(|event| matches!(
        event,
        CacheEvent::RecordRemovalFailed {
            record_id: 1,
            cause: RemovalCause::Orphan,
            ..
        }
    )));

    harness.subsystem.allow_removals().await;
    harness.engine.synchronize(&[meta("A", "u1")]).await.unwrap();
    assert_eq!(harness.subsystem.removed().await, vec![orphan]);
}

#[tokio::test]
async fn test_query_failure_fails_synchronize() {
    let harness = Harness::new();
    harness.subsystem.fail_queries(true).await;

    let result = harness.engine.synchronize(&[meta("A", "u1")]).await;

    assert!(matches!(result, Err(SyncError::Subsystem(_))));
}

#[tokio::test]
async fn test_reconcile_publishes_snapshot() {
    let mut harness = Harness::new();
    harness.subsystem.add_record(1, "u1", successful("file://x/A")).await;
    harness.subsystem.add_record(2, "u9", RecordStatus::Running).await;
    let mut subscription = harness.engine.subscribe();
    assert_eq!(subscription.next().await, Some(SyncState::Synchronizing));

    let reconciliation = harness
        .engine
        .reconcile(&[meta("A", "u1"), meta("B", "u2")])
        .await
        .unwrap();

    assert_eq!(reconciliation.orphans_removed, 1);
    let Some(SyncState::Synchronized(snapshot)) = subscription.next().await else {
        panic!("expected a synchronized snapshot");
    };
    assert_eq!(snapshot, reconciliation.snapshot);
    assert!(harness
        .drain_events()
        .contains(&CacheEvent::SynchronizationCompleted {
            resources: 2,
            orphans_removed: 1,
            downloading: 0,
        }));
}

#[tokio::test]
async fn test_download_publishes_downloading_immediately() {
    let mut harness = Harness::new();
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();

    harness.engine.download(&meta("A", "u1")).await.unwrap();

    assert_eq!(
        harness.engine.publisher().state_of(&Locator::new("u1")),
        Some(CacheState::downloading(meta("A", "u1")))
    );
    assert_eq!(
        harness.subsystem.enqueued().await,
        vec![(Locator::new("u1"), PathBuf::from("x/A"))]
    );
    let events = harness.drain_events();
    assert!(events.contains(&CacheEvent::DownloadEnqueued {
        locator: "u1".to_string(),
        record_id: 0,
    }));
    assert!(events.contains(&CacheEvent::StateChanged {
        locator: "u1".to_string(),
        state: "downloading".to_string(),
    }));

    harness.tasks.shutdown().await;
}

#[tokio::test]
async fn test_download_while_downloading_is_noop() {
    let harness = Harness::new();
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();

    harness.engine.download(&meta("A", "u1")).await.unwrap();
    harness.engine.download(&meta("A", "u1")).await.unwrap();

    assert_eq!(harness.subsystem.enqueued().await.len(), 1);
    assert_eq!(harness.engine.active_observers(), 1);

    harness.tasks.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_downloads_enqueue_once() {
    let harness = Harness::new();
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();
    harness
        .subsystem
        .delay_enqueue(Duration::from_millis(20))
        .await;
    let metadata = meta("A", "u1");

    let (first, second) = tokio::join!(
        harness.engine.download(&metadata),
        harness.engine.download(&metadata)
    );

    first.unwrap();
    second.unwrap();
    assert_eq!(harness.subsystem.enqueued().await.len(), 1);
    assert_eq!(harness.subsystem.records().await.len(), 1);
    assert_eq!(harness.engine.active_observers(), 1);

    harness.tasks.shutdown().await;
}

#[tokio::test]
async fn test_download_is_claimed_before_enqueue_completes() {
    let harness = Harness::new();
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();
    harness
        .subsystem
        .delay_enqueue(Duration::from_millis(20))
        .await;

    let engine = harness.engine.clone();
    let pending = tokio::spawn(async move { engine.download(&meta("A", "u1")).await });
    tokio::task::yield_now().await;

    assert_eq!(
        harness.engine.publisher().state_of(&Locator::new("u1")),
        Some(CacheState::downloading(meta("A", "u1")))
    );
    pending.await.unwrap().unwrap();
    assert_eq!(harness.subsystem.enqueued().await.len(), 1);

    harness.tasks.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_download_releases_claim() {
    let harness = Harness::new();
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();
    harness
        .subsystem
        .delay_enqueue(Duration::from_secs(5))
        .await;

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), harness.engine.download(&meta("A", "u1"))).await;

    assert!(abandoned.is_err());
    assert_eq!(
        harness.engine.publisher().state_of(&Locator::new("u1")),
        Some(CacheState::not_cached(meta("A", "u1")))
    );
    assert_eq!(harness.engine.active_observers(), 0);
}

#[tokio::test]
async fn test_retry_after_error_discards_partial_file() {
    let harness = Harness::new();
    harness
        .subsystem
        .add_record(
            1,
            "u1",
            RecordStatus::Failed {
                error_code: reason::ERROR_CANNOT_RESUME,
            },
        )
        .await;
    let leftover = harness.store.add_file("A").await;
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();
    assert!(matches!(
        harness.engine.publisher().state_of(&Locator::new("u1")),
        Some(CacheState::Error {
            reason: DownloadError::CannotResume,
            ..
        })
    ));

    harness.engine.download(&meta("A", "u1")).await.unwrap();

    assert!(!harness.store.contains(&leftover).await);
    assert_eq!(harness.subsystem.enqueued().await.len(), 1);
    assert_eq!(
        harness.engine.publisher().state_of(&Locator::new("u1")),
        Some(CacheState::downloading(meta("A", "u1")))
    );

    harness.tasks.shutdown().await;
}

#[tokio::test]
async fn test_download_of_unknown_resource_is_rejected() {
    let harness = Harness::new();
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();

    let result = harness.engine.download(&meta("B", "u2")).await;

    assert!(matches!(result, Err(SyncError::UnknownResource { .. })));
    assert!(harness.subsystem.enqueued().await.is_empty());
}

#[tokio::test]
async fn test_enqueue_failure_leaves_state_unchanged() {
    let harness = Harness::new();
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();
    harness.subsystem.fail_enqueue(true).await;

    let result = harness.engine.download(&meta("A", "u1")).await;

    assert!(matches!(result, Err(SyncError::Subsystem(_))));
    assert_eq!(
        harness.engine.publisher().state_of(&Locator::new("u1")),
        Some(CacheState::not_cached(meta("A", "u1")))
    );
    assert_eq!(harness.engine.active_observers(), 0);
}

#[tokio::test]
async fn test_delete_cached_removes_file_and_record() {
    let mut harness = Harness::new();
    let file = harness.store.add_file("A").await;
    harness.subsystem.add_record(3, "u1", successful("file://x/A")).await;
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();
    let cached = harness
        .engine
        .publisher()
        .state_of(&Locator::new("u1"))
        .unwrap();

    harness.engine.delete(&cached).await.unwrap();

    assert!(!harness.store.contains(&file).await);
    assert_eq!(harness.subsystem.removed().await, vec![RecordId(3)]);
    assert_eq!(
        harness.engine.get_cache_state(&meta("A", "u1")).await.unwrap(),
        CacheState::not_cached(meta("A", "u1"))
    );
    assert_eq!(
        harness.engine.publisher().state_of(&Locator::new("u1")),
        Some(CacheState::not_cached(meta("A", "u1")))
    );
    assert!(harness.drain_events().contains(&CacheEvent::RecordRemoved {
        record_id: 3,
        cause: RemovalCause::Deleted,
    }));
}

#[tokio::test]
async fn test_delete_cached_with_missing_file_fails() {
    let harness = Harness::new();
    harness.subsystem.add_record(3, "u1", successful("file://x/A")).await;
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();
    let cached = harness
        .engine
        .publisher()
        .state_of(&Locator::new("u1"))
        .unwrap();

    let result = harness.engine.delete(&cached).await;

    assert!(matches!(result, Err(SyncError::FileStore(_))));
    assert!(harness.subsystem.removed().await.is_empty());
}

#[tokio::test]
async fn test_delete_tolerates_query_failure() {
    let harness = Harness::new();
    harness.engine.reconcile(&[meta("A", "u1")]).await.unwrap();
    harness.subsystem.fail_queries(true).await;

    harness
        .engine
        .delete(&CacheState::not_cached(meta("A", "u1")))
        .await
        .unwrap();

    assert_eq!(
        harness.engine.publisher().state_of(&Locator::new("u1")),
        Some(CacheState::not_cached(meta("A", "u1")))
    );
}
