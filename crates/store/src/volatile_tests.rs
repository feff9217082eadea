// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use serde_json::json;

#[test]
fn set_is_invisible_until_commit() {
    let mut store = VolatileStore::new();
    store.set("k", json!(1), None);
    assert_eq!(store.get("k"), None);

    store.commit();
    assert_eq!(store.get("k"), Some(&json!(1)));
}

#[test]
fn none_value_deletes() {
    let mut store = VolatileStore::new();
    store.set("k", json!(1), None);
    store.commit();

    store.delete("k", None);
    store.commit();
    assert_eq!(store.get("k"), None);
}

#[test]
fn queued_ops_apply_in_order() {
    let mut store = VolatileStore::new();
    store.set("k", json!("first"), None);
    store.set("k", json!("second"), None);
    store.commit();
    assert_eq!(store.get("k"), Some(&json!("second")));
}

#[test]
fn version_bumps_once_per_commit() {
    let mut store = VolatileStore::new();
    assert_eq!(store.version(), 0);

    store.set("a", json!(1), None);
    store.set("b", json!(2), None);
    store.commit();
    assert_eq!(store.version(), 1);

    // Empty commit is a no-op.
    store.commit();
    assert_eq!(store.version(), 1);
}

#[test]
fn snapshot_is_isolated_from_later_commits() {
    let mut store = VolatileStore::new();
    store.set("k", json!("old"), None);
    store.commit();

    let snap = store.snapshot();
    store.set("k", json!("new"), None);
    store.commit();

    assert_eq!(snap.get("k"), Some(&json!("old")));
    assert_eq!(store.get("k"), Some(&json!("new")));
}

#[test]
fn clear_queue_discards_without_applying() {
    let mut store = VolatileStore::new();
    store.set("k", json!(1), None);
    assert!(store.has_pending());

    store.clear_queue();
    assert!(!store.has_pending());
    store.commit();
    assert_eq!(store.get("k"), None);
    assert_eq!(store.version(), 0);
}

proptest! {
    // Snapshot isolation: whatever was committed before the snapshot is
    // what the snapshot keeps showing after any later writes.
    #[test]
    fn prop_snapshot_isolation(
        key in "[a-z]{1,6}",
        before in 0i64..1000,
        after in 0i64..1000,
    ) {
        let mut store = VolatileStore::new();
        store.set(key.clone(), json!(before), None);
        store.commit();

        let snap = store.snapshot();
        store.set(key.clone(), json!(after), None);
        store.commit();

        prop_assert_eq!(snap.get(&key), Some(&json!(before)));
    }
}
