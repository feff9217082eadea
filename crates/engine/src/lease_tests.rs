// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::Value;
use sm_core::FakeClock;
use sm_store::executions;

fn setup() -> (Arc<Database>, FakeClock) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    executions::create(&db, "e1", "test", None, &Value::Null, 0).unwrap();
    let clock = FakeClock::new();
    (db, clock)
}

fn manager(db: &Arc<Database>, clock: &FakeClock) -> Arc<LeaseManager<FakeClock>> {
    Arc::new(LeaseManager::new(
        Arc::clone(db),
        "e1",
        LeaseConfig::default(),
        clock.clone(),
    ))
}

#[tokio::test]
async fn acquire_release_cycle() {
    let (db, clock) = setup();
    tasks::register(&db, "e1", "n1", "claude:sonnet", clock.epoch_ms()).unwrap();
    let lease = manager(&db, &clock);

    assert!(lease.acquire(&NodeId::new("n1")).unwrap());
    let row = tasks::get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(row.lease_owner.as_deref(), Some(lease.process_id()));

    lease.release(&NodeId::new("n1")).unwrap();
    let row = tasks::get(&db, "e1", "n1").unwrap().unwrap();
    assert!(row.lease_owner.is_none());
}

#[tokio::test]
async fn two_processes_cannot_both_hold_a_lease() {
    let (db, clock) = setup();
    tasks::register(&db, "e1", "n1", "t", clock.epoch_ms()).unwrap();
    let first = manager(&db, &clock);
    let second = manager(&db, &clock);

    assert!(first.acquire(&NodeId::new("n1")).unwrap());
    assert!(!second.acquire(&NodeId::new("n1")).unwrap());

    // After expiry, the second process takes over.
    clock.advance(Duration::from_secs(31));
    assert!(second.acquire(&NodeId::new("n1")).unwrap());
}

#[tokio::test]
async fn heartbeat_extends_lease() {
    let (db, clock) = setup();
    tasks::register(&db, "e1", "n1", "t", clock.epoch_ms()).unwrap();
    let lease = manager(&db, &clock);
    lease.acquire(&NodeId::new("n1")).unwrap();

    let before = tasks::get(&db, "e1", "n1").unwrap().unwrap().lease_expires_at.unwrap();
    clock.advance(Duration::from_secs(10));
    lease.heartbeat(&NodeId::new("n1")).unwrap();
    let after = tasks::get(&db, "e1", "n1").unwrap().unwrap().lease_expires_at.unwrap();
    assert!(after > before);
}

#[tokio::test]
async fn orphan_recovery_retry_policy() {
    let (db, clock) = setup();
    tasks::register(&db, "e1", "n1", "t", clock.epoch_ms()).unwrap();
    let lease = manager(&db, &clock);
    lease.acquire(&NodeId::new("n1")).unwrap();

    // Simulate a crash: lease expires without release.
    clock.advance(Duration::from_secs(31));
    let actions = recover_orphans(&db, OrphanPolicy::Retry, 3, &clock).unwrap();
    assert_eq!(
        actions,
        vec![OrphanAction::RetryTask { task_id: "n1".to_string(), retry_count: 1 }]
    );

    let row = tasks::get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(row.status, sm_core::TaskStatus::Pending);
    assert_eq!(row.retry_count, 1);
    assert!(row.lease_owner.is_none());
}

#[tokio::test]
async fn orphan_recovery_retry_exhaustion_marks_orphaned() {
    let (db, clock) = setup();
    tasks::register(&db, "e1", "n1", "t", clock.epoch_ms()).unwrap();
    tasks::reset_for_retry(&db, "e1", "n1", 3).unwrap();
    let lease = manager(&db, &clock);
    lease.acquire(&NodeId::new("n1")).unwrap();

    clock.advance(Duration::from_secs(31));
    let actions = recover_orphans(&db, OrphanPolicy::Retry, 3, &clock).unwrap();
    assert_eq!(actions, vec![OrphanAction::MarkFailed { task_id: "n1".to_string() }]);
    let row = tasks::get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(row.status, sm_core::TaskStatus::Orphaned);
}

#[tokio::test]
async fn orphan_recovery_ignore_policy_emits_nothing() {
    let (db, clock) = setup();
    tasks::register(&db, "e1", "n1", "t", clock.epoch_ms()).unwrap();
    let lease = manager(&db, &clock);
    lease.acquire(&NodeId::new("n1")).unwrap();

    clock.advance(Duration::from_secs(31));
    let actions = recover_orphans(&db, OrphanPolicy::Ignore, 3, &clock).unwrap();
    assert!(actions.is_empty());
    let row = tasks::get(&db, "e1", "n1").unwrap().unwrap();
    assert_eq!(row.status, sm_core::TaskStatus::Orphaned);
}

#[tokio::test]
async fn live_lease_is_not_an_orphan() {
    let (db, clock) = setup();
    tasks::register(&db, "e1", "n1", "t", clock.epoch_ms()).unwrap();
    let lease = manager(&db, &clock);
    lease.acquire(&NodeId::new("n1")).unwrap();

    let actions = recover_orphans(&db, OrphanPolicy::Retry, 3, &clock).unwrap();
    assert!(actions.is_empty());
}

#[test]
fn cancellation_signal_roundtrip() {
    let cancels = CancellationHandler::new();
    let id = NodeId::new("n1");
    let token = cancels.token(&id);
    assert!(!token.is_cancelled());

    cancels.request_cancel(&id);
    assert!(token.is_cancelled());
    assert!(cancels.is_cancelled(&id));

    cancels.clear(&id);
    assert!(!cancels.is_cancelled(&id));
}
