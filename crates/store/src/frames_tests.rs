// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::executions;
use serde_json::Value;

fn db() -> Database {
    let db = Database::open_in_memory().unwrap();
    executions::create(&db, "e1", "test", None, &Value::Null, 0).unwrap();
    db
}

fn put(db: &Database, seq: u64, plan: &str) -> i64 {
    insert(db, "e1", seq, plan, &format!("hash-{seq}"), None, None, &[], seq * 1_000).unwrap()
}

#[test]
fn insert_and_get() {
    let db = db();
    put(&db, 0, "<end/>\n");

    let frame = get(&db, "e1", 0).unwrap().unwrap();
    assert_eq!(frame.sequence, 0);
    assert_eq!(frame.plan_text, "<end/>\n");
    assert_eq!(frame.plan_hash, "hash-0");
}

#[test]
fn duplicate_sequence_is_rejected() {
    let db = db();
    put(&db, 0, "a");
    let err = insert(&db, "e1", 0, "b", "h", None, None, &[], 0);
    assert!(err.is_err());
}

#[test]
fn latest_sequence_tracks_max() {
    let db = db();
    assert_eq!(latest_sequence(&db, "e1").unwrap(), None);
    put(&db, 0, "a");
    put(&db, 1, "b");
    put(&db, 2, "c");
    assert_eq!(latest_sequence(&db, "e1").unwrap(), Some(2));
}

#[test]
fn list_respects_bounds() {
    let db = db();
    for seq in 0..5 {
        put(&db, seq, "plan");
    }

    let all = list(&db, "e1", None, None).unwrap();
    assert_eq!(all.len(), 5);

    let middle = list(&db, "e1", Some(1), Some(3)).unwrap();
    assert_eq!(middle.len(), 3);
    assert_eq!(middle[0].sequence, 1);
    assert_eq!(middle[2].sequence, 3);
}

#[test]
fn mounted_ids_roundtrip() {
    let db = db();
    let ids = vec!["n1".to_string(), "n2".to_string()];
    insert(&db, "e1", 0, "p", "h", Some("phase-1"), Some("step-a"), &ids, 0).unwrap();

    let frame = get(&db, "e1", 0).unwrap().unwrap();
    assert_eq!(frame.mounted_ids, ids);
    assert_eq!(frame.phase_marker.as_deref(), Some("phase-1"));
    assert_eq!(frame.step_marker.as_deref(), Some("step-a"));
}

#[test]
fn truncate_after_removes_later_frames() {
    let db = db();
    for seq in 0..5 {
        put(&db, seq, "plan");
    }
    let deleted = truncate_after(&db, "e1", 2).unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(count(&db, "e1").unwrap(), 3);
    assert_eq!(latest_sequence(&db, "e1").unwrap(), Some(2));
}
