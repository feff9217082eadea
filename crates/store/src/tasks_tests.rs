// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::executions;
use serde_json::Value;

const LEASE_MS: u64 = 30_000;

fn db() -> Database {
    let db = Database::open_in_memory().unwrap();
    executions::create(&db, "e1", "test", None, &Value::Null, 0).unwrap();
    db
}

#[test]
fn register_and_get() {
    let db = db();
    register(&db, "e1", "n1", "claude:sonnet", 1_000).unwrap();

    let task = get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.name, "claude:sonnet");
    assert_eq!(task.retry_count, 0);
    assert!(task.lease_owner.is_none());
}

#[test]
fn register_twice_resets_status() {
    let db = db();
    register(&db, "e1", "n1", "claude:sonnet", 1_000).unwrap();
    set_status(&db, "e1", "n1", TaskStatus::Failed, 2_000).unwrap();

    register(&db, "e1", "n1", "claude:sonnet", 3_000).unwrap();
    let task = get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.completed_at.is_none());
}

#[test]
fn lease_acquire_succeeds_when_unowned() {
    let db = db();
    register(&db, "e1", "n1", "t", 1_000).unwrap();

    assert!(acquire_lease(&db, "e1", "n1", "proc-a", LEASE_MS, 1_000).unwrap());
    let task = get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.lease_owner.as_deref(), Some("proc-a"));
}

#[test]
fn lease_is_exclusive_while_live() {
    let db = db();
    register(&db, "e1", "n1", "t", 1_000).unwrap();
    assert!(acquire_lease(&db, "e1", "n1", "proc-a", LEASE_MS, 1_000).unwrap());

    // Another process cannot take a live lease.
    assert!(!acquire_lease(&db, "e1", "n1", "proc-b", LEASE_MS, 2_000).unwrap());

    // The owner can re-acquire (renew).
    assert!(acquire_lease(&db, "e1", "n1", "proc-a", LEASE_MS, 2_000).unwrap());
}

#[test]
fn expired_lease_can_be_taken_over() {
    let db = db();
    register(&db, "e1", "n1", "t", 1_000).unwrap();
    assert!(acquire_lease(&db, "e1", "n1", "proc-a", LEASE_MS, 1_000).unwrap());

    let after_expiry = 1_000 + LEASE_MS + 1;
    assert!(acquire_lease(&db, "e1", "n1", "proc-b", LEASE_MS, after_expiry).unwrap());
    let task = get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(task.lease_owner.as_deref(), Some("proc-b"));
}

#[test]
fn acquire_for_missing_task_is_not_found() {
    // A missing row must not read like an ordinary busy lease.
    let db = db();
    assert!(matches!(
        acquire_lease(&db, "e1", "ghost", "proc-a", LEASE_MS, 1_000),
        Err(StoreError::NotFound { kind: "task", .. })
    ));
}

#[test]
fn heartbeat_extends_only_for_owner() {
    let db = db();
    register(&db, "e1", "n1", "t", 1_000).unwrap();
    acquire_lease(&db, "e1", "n1", "proc-a", LEASE_MS, 1_000).unwrap();
    let before = get(&db, "e1", "n1").unwrap().unwrap().lease_expires_at.unwrap();

    heartbeat(&db, "e1", "n1", "proc-b", LEASE_MS, 20_000).unwrap();
    assert_eq!(get(&db, "e1", "n1").unwrap().unwrap().lease_expires_at.unwrap(), before);

    heartbeat(&db, "e1", "n1", "proc-a", LEASE_MS, 20_000).unwrap();
    assert!(get(&db, "e1", "n1").unwrap().unwrap().lease_expires_at.unwrap() > before);
}

#[test]
fn release_clears_owner() {
    let db = db();
    register(&db, "e1", "n1", "t", 1_000).unwrap();
    acquire_lease(&db, "e1", "n1", "proc-a", LEASE_MS, 1_000).unwrap();

    release_lease(&db, "e1", "n1", "proc-a").unwrap();
    let task = get(&db, "e1", "n1").unwrap().unwrap();
    assert!(task.lease_owner.is_none());
    assert!(task.lease_expires_at.is_none());
}

#[test]
fn orphan_detection_finds_expired_running_tasks() {
    let db = db();
    register(&db, "e1", "n1", "t", 1_000).unwrap();
    register(&db, "e1", "n2", "t", 1_000).unwrap();
    acquire_lease(&db, "e1", "n1", "proc-a", LEASE_MS, 1_000).unwrap();
    acquire_lease(&db, "e1", "n2", "proc-a", LEASE_MS, 1_000).unwrap();

    // n2 completed cleanly; n1's process died.
    set_status(&db, "e1", "n2", TaskStatus::Completed, 5_000).unwrap();

    let orphans = find_orphans(&db, 1_000 + LEASE_MS + 1).unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].id, "n1");
}

#[test]
fn retry_reset_increments_and_clears_lease() {
    let db = db();
    register(&db, "e1", "n1", "t", 1_000).unwrap();
    acquire_lease(&db, "e1", "n1", "proc-a", LEASE_MS, 1_000).unwrap();

    reset_for_retry(&db, "e1", "n1", 1).unwrap();
    let task = get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retry_count, 1);
    assert!(task.lease_owner.is_none());
}

#[test]
fn mark_orphaned_is_terminal() {
    let db = db();
    register(&db, "e1", "n1", "t", 1_000).unwrap();
    acquire_lease(&db, "e1", "n1", "proc-a", LEASE_MS, 1_000).unwrap();

    mark_orphaned(&db, "e1", "n1").unwrap();
    let task = get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Orphaned);
    assert!(task.lease_owner.is_none());
}

#[test]
fn terminal_status_stamps_completed_at() {
    let db = db();
    register(&db, "e1", "n1", "t", 1_000).unwrap();
    set_status(&db, "e1", "n1", TaskStatus::Running, 2_000).unwrap();
    assert!(get(&db, "e1", "n1").unwrap().unwrap().completed_at.is_none());

    set_status(&db, "e1", "n1", TaskStatus::Completed, 3_000).unwrap();
    assert!(get(&db, "e1", "n1").unwrap().unwrap().completed_at.is_some());
}
