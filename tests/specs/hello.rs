// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal hello: one agent node, no handlers

use super::prelude::*;

fn hello() -> Component {
    Arc::new(|_ctx| Node::Claude(ClaudeNode::new("Say hi.").id("greeter").max_turns(1)))
}

#[tokio::test(start_paused = true)]
async fn one_agent_one_completion() {
    let spec = Spec::new();
    let mut tick = spec.tick_loop(hello());

    let status = tick.run().await.unwrap();
    assert_eq!(status, ExecutionStatus::Completed);

    let execution = spec.execution();
    assert_eq!(execution.status, ExecutionStatus::Completed);

    // Two frames: mount and terminal.
    assert_eq!(spec.frame_count(), 2);

    // One completed task row.
    let task = spec.task("greeter").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    // No handlers were supplied, so no state was written.
    assert_eq!(spec.transition_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn frames_are_dense_and_increasing() {
    let spec = Spec::new();
    let mut tick = spec.tick_loop(hello());
    tick.run().await.unwrap();

    let rows = frames::list(&spec.db, spec.execution_id.as_str(), None, None).unwrap();
    let sequences: Vec<u64> = rows.iter().map(|f| f.sequence).collect();
    assert_eq!(sequences, vec![0, 1]);
}

#[tokio::test(start_paused = true)]
async fn frame_plan_is_recoverable() {
    let spec = Spec::new();
    let mut tick = spec.tick_loop(hello());
    tick.run().await.unwrap();

    let frame = frames::get(&spec.db, spec.execution_id.as_str(), 0).unwrap().unwrap();
    let plan = sm_core::parse_plan(&frame.plan_text).unwrap();
    assert_eq!(plan.tag, "claude");
    assert!(plan.attrs.iter().any(|(k, v)| k == "id" && v == "greeter"));
}
