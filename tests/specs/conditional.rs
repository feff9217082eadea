// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conditional mount: state flips drive the tree

use super::prelude::*;

fn conditional() -> Component {
    Arc::new(|ctx| {
        let enabled = ctx.state.get("enabled").and_then(Value::as_bool).unwrap_or(false);
        Node::when(
            enabled,
            vec![Node::Claude(ClaudeNode::new("go").id("worker").max_turns(1))],
        )
    })
}

#[tokio::test(start_paused = true)]
async fn disabled_tree_mounts_nothing() {
    let spec = Spec::new();
    spec.seed_state("enabled", json!(false));
    let mut tick = spec.tick_loop(conditional());
    tick.startup().unwrap();

    let outcome = tick.run_until_idle().await.unwrap();
    assert!(outcome.quiescent);
    assert_eq!(spec.frame_count(), 1);
    assert!(spec.task("worker").is_none());
}

#[tokio::test(start_paused = true)]
async fn flipping_the_flag_mounts_the_agent() {
    let spec = Spec::new();
    spec.seed_state("enabled", json!(false));
    let mut tick = spec.tick_loop(conditional());
    tick.startup().unwrap();
    tick.run_until_idle().await.unwrap();

    // What the set_state tool does: write the key, request a re-render.
    spec.seed_state("enabled", json!(true));
    tick.request_rerender();
    let outcome = tick.run_until_idle().await.unwrap();
    assert!(outcome.quiescent);

    let task = spec.task("worker").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}
