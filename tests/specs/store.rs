// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store contract specs: snapshot isolation and commit atomicity

use super::prelude::*;

#[test]
fn snapshot_isolation_holds_across_commits() {
    let spec = Spec::new();
    let mut store = DurableStore::new(Arc::clone(&spec.db), spec.execution_id.as_str());

    store.set("k", json!("before"), None);
    store.commit(1_000).unwrap();

    let snap = store.snapshot().unwrap();
    store.set("k", json!("after"), None);
    store.commit(2_000).unwrap();

    assert_eq!(snap.get("k"), Some(&json!("before")));
    assert_eq!(store.get("k").unwrap(), Some(json!("after")));
}

#[test]
fn uncommitted_queue_is_invisible_after_reopen() {
    // A crash between queueing and commit leaves nothing behind.
    let dir = tempfile::tempdir().unwrap();
    let spec = Spec::on_disk(dir.path());
    let execution_id = spec.execution_id.clone();

    {
        let mut store = DurableStore::new(Arc::clone(&spec.db), execution_id.as_str());
        store.set("k", json!("doomed"), None);
        // No commit: the process dies here.
    }
    drop(spec);

    let db = Arc::new(Database::open(dir.path().join("db.sqlite")).unwrap());
    let store = DurableStore::new(db, execution_id.as_str());
    assert_eq!(store.get("k").unwrap(), None);
    assert!(store.snapshot().unwrap().is_empty());
}

#[test]
fn committed_writes_survive_reopen_with_their_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let spec = Spec::on_disk(dir.path());
    let execution_id = spec.execution_id.clone();

    {
        let mut store = DurableStore::new(Arc::clone(&spec.db), execution_id.as_str());
        store.set("a", json!(1), Some("commit:1".to_string()));
        store.set("b", json!(2), Some("commit:1".to_string()));
        store.commit(1_000).unwrap();
    }
    drop(spec);

    let db = Arc::new(Database::open(dir.path().join("db.sqlite")).unwrap());
    let store = DurableStore::new(Arc::clone(&db), execution_id.as_str());
    assert_eq!(store.get("a").unwrap(), Some(json!(1)));
    assert_eq!(store.get("b").unwrap(), Some(json!(2)));

    // Both writes and both transition rows are visible, or none would
    // have been: the commit is one transaction.
    assert_eq!(transitions::count(&db, execution_id.as_str()).unwrap(), 2);
}

#[test]
fn volatile_store_is_lost_by_design() {
    let mut store = sm_store::VolatileStore::new();
    store.set("k", json!(1), None);
    store.commit();
    assert_eq!(store.get("k"), Some(&json!(1)));
    drop(store);

    let store = sm_store::VolatileStore::new();
    assert_eq!(store.get("k"), None);
}
