// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn db() -> Database {
    Database::open_in_memory().unwrap()
}

#[test]
fn create_and_get() {
    let db = db();
    create(&db, "abc-123", "hello", Some("hello.rs"), &json!({"limit": 5}), 1_000).unwrap();

    let row = get(&db, "abc-123").unwrap().unwrap();
    assert_eq!(row.name, "hello");
    assert_eq!(row.source_ref.as_deref(), Some("hello.rs"));
    assert_eq!(row.config, json!({"limit": 5}));
    assert_eq!(row.status, ExecutionStatus::Pending);
    assert!(row.started_at.is_none());
}

#[test]
fn get_missing_returns_none() {
    assert!(get(&db(), "nope").unwrap().is_none());
}

#[test]
fn prefix_resolution() {
    let db = db();
    create(&db, "abc-123", "a", None, &Value::Null, 0).unwrap();
    create(&db, "abd-456", "b", None, &Value::Null, 0).unwrap();

    assert_eq!(resolve_prefix(&db, "abc").unwrap(), "abc-123");
    assert!(matches!(
        resolve_prefix(&db, "ab"),
        Err(StoreError::AmbiguousPrefix { count: 2, .. })
    ));
    assert!(matches!(resolve_prefix(&db, "zzz"), Err(StoreError::NotFound { .. })));
}

#[test]
fn lifecycle_transitions() {
    let db = db();
    create(&db, "e1", "run", None, &Value::Null, 1_000).unwrap();

    mark_started(&db, "e1", 2_000).unwrap();
    let row = get(&db, "e1").unwrap().unwrap();
    assert_eq!(row.status, ExecutionStatus::Running);
    let started = row.started_at.clone().unwrap();

    // Second start (resume) keeps the original timestamp.
    mark_started(&db, "e1", 9_000).unwrap();
    assert_eq!(get(&db, "e1").unwrap().unwrap().started_at.unwrap(), started);

    mark_finished(&db, "e1", ExecutionStatus::Failed, Some("frame storm"), 3_000).unwrap();
    let row = get(&db, "e1").unwrap().unwrap();
    assert_eq!(row.status, ExecutionStatus::Failed);
    assert_eq!(row.stop_reason.as_deref(), Some("frame storm"));
    assert!(row.completed_at.is_some());
}

#[test]
fn counters_update_absolutely() {
    let db = db();
    create(&db, "e1", "run", None, &Value::Null, 0).unwrap();
    update_counters(&db, "e1", 2, 1_500, 7).unwrap();
    update_counters(&db, "e1", 3, 2_000, 9).unwrap();

    let row = get(&db, "e1").unwrap().unwrap();
    assert_eq!(row.iterations, 3);
    assert_eq!(row.total_tokens, 2_000);
    assert_eq!(row.total_tool_calls, 9);
}

#[test]
fn list_recent_orders_newest_first() {
    let db = db();
    create(&db, "e1", "first", None, &Value::Null, 1_000).unwrap();
    create(&db, "e2", "second", None, &Value::Null, 2_000).unwrap();
    create(&db, "e3", "third", None, &Value::Null, 3_000).unwrap();

    let rows = list_recent(&db, 2).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "e3");
    assert_eq!(rows[1].id, "e2");
    assert_eq!(count(&db).unwrap(), 3);
}
