// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery: expired leases retry on the next process

use super::prelude::*;
use sm_core::FakeClock;
use sm_engine::{recover_orphans, LeaseConfig, LeaseManager, OrphanAction, OrphanPolicy};

#[tokio::test(start_paused = true)]
async fn orphaned_task_is_retried_and_completed_by_the_next_process() {
    let dir = tempfile::tempdir().unwrap();
    let spec = Spec::on_disk(dir.path());
    let clock = FakeClock::new();

    // Process A registers the task and acquires its lease, then "dies"
    // without releasing (the manager is simply dropped).
    tasks::register(&spec.db, spec.execution_id.as_str(), "greeter", "claude:sonnet", 0).unwrap();
    {
        let process_a = LeaseManager::new(
            Arc::clone(&spec.db),
            spec.execution_id.as_str(),
            LeaseConfig::default(),
            clock.clone(),
        );
        assert!(process_a.acquire(&sm_core::NodeId::new("greeter")).unwrap());
    }

    // Lease expires.
    clock.advance(Duration::from_secs(31));

    // Process B starts up and sweeps orphans.
    let actions = recover_orphans(&spec.db, OrphanPolicy::Retry, 3, &clock).unwrap();
    assert_eq!(
        actions,
        vec![OrphanAction::RetryTask { task_id: "greeter".to_string(), retry_count: 1 }]
    );

    let task = spec.task("greeter").unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retry_count, 1);
    assert!(task.lease_owner.is_none());

    // Process B runs the component; the node mounts again and the task
    // completes under the new lease.
    let component: Component =
        Arc::new(|_ctx| Node::Claude(ClaudeNode::new("Say hi.").id("greeter").max_turns(1)));
    let mut tick = spec.tick_loop(component);
    let status = tick.run().await.unwrap();
    assert_eq!(status, ExecutionStatus::Completed);

    let task = spec.task("greeter").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_count, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_mark_the_task_orphaned() {
    let spec = Spec::new();
    let clock = FakeClock::new();

    tasks::register(&spec.db, spec.execution_id.as_str(), "greeter", "t", 0).unwrap();
    tasks::reset_for_retry(&spec.db, spec.execution_id.as_str(), "greeter", 3).unwrap();
    let manager = LeaseManager::new(
        Arc::clone(&spec.db),
        spec.execution_id.as_str(),
        LeaseConfig::default(),
        clock.clone(),
    );
    manager.acquire(&sm_core::NodeId::new("greeter")).unwrap();
    clock.advance(Duration::from_secs(31));

    let actions = recover_orphans(&spec.db, OrphanPolicy::Retry, 3, &clock).unwrap();
    assert_eq!(actions, vec![OrphanAction::MarkFailed { task_id: "greeter".to_string() }]);
    assert_eq!(spec.task("greeter").unwrap().status, TaskStatus::Orphaned);
}

#[tokio::test(start_paused = true)]
async fn lease_exclusivity_across_processes() {
    let spec = Spec::new();
    let clock = FakeClock::new();
    tasks::register(&spec.db, spec.execution_id.as_str(), "n1", "t", 0).unwrap();

    let process_a = LeaseManager::new(
        Arc::clone(&spec.db),
        spec.execution_id.as_str(),
        LeaseConfig::default(),
        clock.clone(),
    );
    let process_b = LeaseManager::new(
        Arc::clone(&spec.db),
        spec.execution_id.as_str(),
        LeaseConfig::default(),
        clock.clone(),
    );

    assert!(process_a.acquire(&sm_core::NodeId::new("n1")).unwrap());
    assert!(!process_b.acquire(&sm_core::NodeId::new("n1")).unwrap());

    // Heartbeats keep the lease alive past its nominal duration.
    clock.advance(Duration::from_secs(20));
    process_a.heartbeat(&sm_core::NodeId::new("n1")).unwrap();
    clock.advance(Duration::from_secs(20));
    assert!(!process_b.acquire(&sm_core::NodeId::new("n1")).unwrap());

    // Without further heartbeats it expires and B takes over.
    clock.advance(Duration::from_secs(31));
    assert!(process_b.acquire(&sm_core::NodeId::new("n1")).unwrap());
}
