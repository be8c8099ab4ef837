//! Integration tests for SqliteRecordStore
//!
//! These tests exercise every ILocalStore method against an in-memory
//! SQLite database. Each test function creates a fresh database to
//! ensure test isolation.

use serde_json::json;

use keepsync_cache::{DatabasePool, SqliteRecordStore};
use keepsync_core::domain::{DatasetId, OwnerId, Partition, Record, RecordKey, Timestamp};
use keepsync_core::ports::{ILocalStore, RecordFilter};

// ============================================================================
// Test helpers
// ============================================================================

/// Create a fresh in-memory store for each test
async fn setup() -> SqliteRecordStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteRecordStore::new(pool)
}

fn dataset(name: &str) -> DatasetId {
    DatasetId::new(name).unwrap()
}

fn owner(name: &str) -> OwnerId {
    OwnerId::new(name).unwrap()
}

fn record(ds: &str, key: &str, who: Option<&str>, at: i64) -> Record {
    Record::new_at(
        RecordKey::new(key).unwrap(),
        dataset(ds),
        who.map(owner),
        json!({"key": key}),
        Timestamp::from_millis(at),
    )
}

// ============================================================================
// Basic CRUD
// ============================================================================

#[tokio::test]
async fn test_put_and_get_private_record() {
    let store = setup().await;
    let r = record("messages", "m1", Some("alice"), 1_000).with_parent("c1");
    store.put(Partition::Private, &r).await.unwrap();

    let fetched = store
        .get(
            Partition::Private,
            &dataset("messages"),
            Some(&owner("alice")),
            r.key(),
        )
        .await
        .unwrap()
        .expect("record should exist");

    assert_eq!(fetched, r);
    assert_eq!(fetched.parent_id(), Some("c1"));
    assert_eq!(fetched.payload()["key"], "m1");
}

#[tokio::test]
async fn test_get_missing_returns_none() {
    let store = setup().await;
    let result = store
        .get(
            Partition::Public,
            &dataset("help"),
            None,
            &RecordKey::new("nope").unwrap(),
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_put_replaces_existing() {
    let store = setup().await;
    let mut r = record("notes", "n1", Some("alice"), 1_000);
    store.put(Partition::Private, &r).await.unwrap();

    r.update_payload(json!({"v": 2}), Timestamp::from_millis(2_000));
    store.put(Partition::Private, &r).await.unwrap();

    let all = store
        .query(Partition::Private, &RecordFilter::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].payload()["v"], 2);
    assert_eq!(all[0].created_at().as_millis(), 1_000);
}

#[tokio::test]
async fn test_tombstone_roundtrip() {
    let store = setup().await;
    let mut r = record("notes", "n1", Some("alice"), 1_000);
    r.mark_deleted(Timestamp::from_millis(3_000));
    store.put(Partition::Private, &r).await.unwrap();

    let fetched = store
        .get(Partition::Private, &dataset("notes"), Some(&owner("alice")), r.key())
        .await
        .unwrap()
        .unwrap();
    assert!(fetched.is_deleted());
    assert_eq!(fetched.last_modified().as_millis(), 3_000);
}

#[tokio::test]
async fn test_delete_reports_whether_row_existed() {
    let store = setup().await;
    let r = record("notes", "n1", Some("alice"), 0);
    store.put(Partition::Private, &r).await.unwrap();

    let ds = dataset("notes");
    let alice = owner("alice");
    assert!(store
        .delete(Partition::Private, &ds, Some(&alice), r.key())
        .await
        .unwrap());
    assert!(!store
        .delete(Partition::Private, &ds, Some(&alice), r.key())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_touch_updates_only_last_read() {
    let store = setup().await;
    let original = record("notes", "n1", Some("alice"), 1_000);
    store.put(Partition::Private, &original).await.unwrap();

    let touched = store
        .touch(
            Partition::Private,
            &dataset("notes"),
            Some(&owner("alice")),
            original.key(),
            Timestamp::from_millis(9_000),
        )
        .await
        .unwrap();
    assert!(touched);

    let fetched = store
        .get(Partition::Private, &dataset("notes"), Some(&owner("alice")), original.key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.last_read(), Timestamp::from_millis(9_000));
    assert_eq!(fetched.last_modified(), original.last_modified());
    assert_eq!(fetched.payload(), original.payload());

    let missing = store
        .touch(
            Partition::Private,
            &dataset("notes"),
            Some(&owner("alice")),
            &RecordKey::new("nope").unwrap(),
            Timestamp::from_millis(9_000),
        )
        .await
        .unwrap();
    assert!(!missing);
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test]
async fn test_same_key_is_isolated_per_owner_and_partition() {
    let store = setup().await;
    store
        .put(Partition::Private, &record("notes", "k", Some("alice"), 1))
        .await
        .unwrap();
    store
        .put(Partition::Private, &record("notes", "k", Some("bob"), 2))
        .await
        .unwrap();
    store
        .put(Partition::Public, &record("notes", "k", None, 3))
        .await
        .unwrap();

    let alice_only = store
        .query(
            Partition::Private,
            &RecordFilter::new().with_owner(owner("alice")),
        )
        .await
        .unwrap();
    assert_eq!(alice_only.len(), 1);
    assert_eq!(alice_only[0].created_at().as_millis(), 1);

    let public = store
        .query(Partition::Public, &RecordFilter::new())
        .await
        .unwrap();
    assert_eq!(public.len(), 1);
    assert!(public[0].owner_id().is_none());
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_query_by_last_read_and_liveness() {
    let store = setup().await;
    let old = record("vocab", "old", Some("alice"), 100);
    let fresh = record("vocab", "fresh", Some("alice"), 5_000);
    let mut dead = record("vocab", "dead", Some("alice"), 100);
    dead.mark_deleted(Timestamp::from_millis(200));
    for r in [&old, &fresh, &dead] {
        store.put(Partition::Private, r).await.unwrap();
    }

    let stale = store
        .query(
            Partition::Private,
            &RecordFilter::new().with_last_read_before(Timestamp::from_millis(1_000)),
        )
        .await
        .unwrap();
    assert_eq!(stale.len(), 2);

    let live = store
        .query(Partition::Private, &RecordFilter::new().live_only())
        .await
        .unwrap();
    let keys: Vec<_> = live.iter().map(|r| r.key().as_str()).collect();
    assert_eq!(keys, vec!["fresh", "old"]);
}

#[tokio::test]
async fn test_query_with_parent_excluding_dataset() {
    let store = setup().await;
    store
        .put(Partition::Private, &record("conversations", "c1", Some("a"), 0))
        .await
        .unwrap();
    store
        .put(
            Partition::Private,
            &record("messages", "m1", Some("a"), 0).with_parent("c1"),
        )
        .await
        .unwrap();
    store
        .put(Partition::Private, &record("messages", "m2", Some("a"), 0))
        .await
        .unwrap();

    let children = store
        .query(
            Partition::Private,
            &RecordFilter::new()
                .with_parent()
                .excluding_dataset(dataset("conversations")),
        )
        .await
        .unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].key().as_str(), "m1");
}

#[tokio::test]
async fn test_delete_matching_inverted_owner() {
    let store = setup().await;
    for who in ["alice", "bob", "carol"] {
        store
            .put(Partition::Private, &record("notes", "k", Some(who), 0))
            .await
            .unwrap();
    }

    let removed = store
        .delete_matching(
            Partition::Private,
            &RecordFilter::new()
                .with_dataset(dataset("notes"))
                .excluding_owner(owner("alice")),
        )
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let left = store
        .query(Partition::Private, &RecordFilter::new())
        .await
        .unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].owner_id(), Some(&owner("alice")));
}

// ============================================================================
// Bulk replacement and lifecycle
// ============================================================================

#[tokio::test]
async fn test_replace_all_swaps_only_target_slice() {
    let store = setup().await;
    store
        .put(Partition::Private, &record("notes", "old", Some("alice"), 0))
        .await
        .unwrap();
    store
        .put(Partition::Private, &record("notes", "other", Some("bob"), 0))
        .await
        .unwrap();

    let replacement = vec![
        record("notes", "a", Some("alice"), 1),
        record("notes", "b", Some("alice"), 2),
    ];
    store
        .replace_all(
            Partition::Private,
            &dataset("notes"),
            Some(&owner("alice")),
            &replacement,
        )
        .await
        .unwrap();

    let alice = store
        .query(
            Partition::Private,
            &RecordFilter::new().with_owner(owner("alice")),
        )
        .await
        .unwrap();
    let keys: Vec<_> = alice.iter().map(|r| r.key().as_str()).collect();
    assert_eq!(keys, vec!["a", "b"]);

    let bob = store
        .query(Partition::Private, &RecordFilter::new().with_owner(owner("bob")))
        .await
        .unwrap();
    assert_eq!(bob.len(), 1);
}

#[tokio::test]
async fn test_recreate_drops_everything() {
    let store = setup().await;
    for partition in Partition::ALL {
        store
            .put(partition, &record("notes", "k", Some("alice"), 0))
            .await
            .unwrap();
    }

    store.recreate().await.unwrap();

    for partition in Partition::ALL {
        let all = store.query(partition, &RecordFilter::new()).await.unwrap();
        assert!(all.is_empty(), "{partition} not empty");
    }
}

#[tokio::test]
async fn test_closed_pool_is_unavailable_until_reinitialized() {
    let store = setup().await;
    store.close().await;

    let err = store
        .query(Partition::Private, &RecordFilter::new())
        .await
        .unwrap_err();
    assert!(err.is_unavailable(), "unexpected error: {err}");

    store.reinitialize().await.unwrap();
    let all = store
        .query(Partition::Private, &RecordFilter::new())
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");

    {
        let store = SqliteRecordStore::new(DatabasePool::new(&path).await.unwrap());
        store
            .put(Partition::Private, &record("notes", "k", Some("alice"), 7))
            .await
            .unwrap();
        store.close().await;
    }

    let store = SqliteRecordStore::new(DatabasePool::new(&path).await.unwrap());
    let all = store
        .query(Partition::Private, &RecordFilter::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].created_at().as_millis(), 7);
}
