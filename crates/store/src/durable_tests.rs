// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::executions;
use serde_json::json;

fn store() -> DurableStore {
    let db = Arc::new(Database::open_in_memory().unwrap());
    executions::create(&db, "e1", "test", None, &Value::Null, 0).unwrap();
    DurableStore::new(db, "e1")
}

#[test]
fn set_is_invisible_until_commit() {
    let mut store = store();
    store.set("k", json!(1), None);
    assert_eq!(store.get("k").unwrap(), None);

    store.commit(1_000).unwrap();
    assert_eq!(store.get("k").unwrap(), Some(json!(1)));
}

#[test]
fn commit_writes_transitions() {
    let mut store = store();
    store.set("k", json!("a"), Some("test:setup".to_string()));
    store.commit(1_000).unwrap();
    store.set("k", json!("b"), Some("test:update".to_string()));
    store.commit(2_000).unwrap();

    let transitions =
        crate::transitions::list(store.db(), "e1", None, 10).unwrap();
    assert_eq!(transitions.len(), 2);
    // Newest first.
    assert_eq!(transitions[0].old_value, Some(json!("a")));
    assert_eq!(transitions[0].new_value, Some(json!("b")));
    assert_eq!(transitions[0].trigger.as_deref(), Some("test:update"));
}

#[test]
fn delete_removes_row_and_logs_transition() {
    let mut store = store();
    store.set("k", json!(1), None);
    store.commit(1_000).unwrap();

    store.delete("k", Some("cleanup".to_string()));
    store.commit(2_000).unwrap();

    assert_eq!(store.get("k").unwrap(), None);
    let transitions = crate::transitions::list(store.db(), "e1", Some("k"), 10).unwrap();
    assert_eq!(transitions[0].new_value, None);
}

#[test]
fn snapshot_is_isolated_from_later_commits() {
    let mut store = store();
    store.set("k", json!("old"), None);
    store.commit(1_000).unwrap();

    let snap = store.snapshot().unwrap();
    store.set("k", json!("new"), None);
    store.commit(2_000).unwrap();

    assert_eq!(snap.get("k"), Some(&json!("old")));
    assert_eq!(store.get("k").unwrap(), Some(json!("new")));
}

#[test]
fn values_stored_canonically() {
    let mut store = store();
    store.set("obj", json!({"b": 1, "a": 2}), None);
    store.commit(1_000).unwrap();

    let text: String = store
        .db()
        .with_conn(|conn| {
            conn.query_row(
                "SELECT value_json FROM state WHERE execution_id = 'e1' AND key = 'obj'",
                [],
                |row| row.get(0),
            )
        })
        .unwrap();
    assert_eq!(text, r#"{"a":2,"b":1}"#);
}

#[test]
fn empty_commit_is_noop() {
    let mut store = store();
    store.commit(1_000).unwrap();
    let transitions = crate::transitions::list(store.db(), "e1", None, 10).unwrap();
    assert!(transitions.is_empty());
}

#[test]
fn clear_queue_discards() {
    let mut store = store();
    store.set("k", json!(1), None);
    assert!(store.has_pending());
    store.clear_queue();
    assert!(!store.has_pending());
    store.commit(1_000).unwrap();
    assert_eq!(store.get("k").unwrap(), None);
}

#[test]
fn two_stores_scope_by_execution() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    executions::create(&db, "e1", "one", None, &Value::Null, 0).unwrap();
    executions::create(&db, "e2", "two", None, &Value::Null, 0).unwrap();

    let mut a = DurableStore::new(Arc::clone(&db), "e1");
    let mut b = DurableStore::new(db, "e2");
    a.set("k", json!("from-a"), None);
    a.commit(1_000).unwrap();
    b.set("k", json!("from-b"), None);
    b.commit(1_000).unwrap();

    assert_eq!(a.get("k").unwrap(), Some(json!("from-a")));
    assert_eq!(b.get("k").unwrap(), Some(json!("from-b")));
}

#[test]
fn set_serialize_accepts_serializable_types() {
    #[derive(serde::Serialize)]
    struct Payload {
        count: u32,
    }

    let mut store = store();
    store.set_serialize("typed", &Payload { count: 3 }, None).unwrap();
    store.commit(1_000).unwrap();
    assert_eq!(store.get("typed").unwrap(), Some(json!({"count": 3})));
}
