// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame-storm detection

use super::prelude::*;
use sm_engine::EngineError;

#[tokio::test(start_paused = true)]
async fn write_back_loop_trips_the_guard() {
    let spec = Spec::new();
    spec.seed_state("x", json!("same"));

    // Deps-less effect re-runs every frame, writing back the value it
    // read: the plan and state never change, but frames keep coming.
    let component: Component = Arc::new(|ctx| {
        let value = ctx.state.get("x").cloned().unwrap_or(Value::Null);
        Node::fragment(vec![Node::Effect(sm_core::EffectNode::new(
            None,
            Arc::new(move |hctx| {
                hctx.state_set("x", value.clone());
                None
            }),
        ))])
    });
    let mut tick = spec.tick_loop(component);

    let error = tick.run().await.unwrap_err();
    assert!(matches!(error, EngineError::FrameStorm(_)), "got {error:?}");

    let execution = spec.execution();
    assert_eq!(execution.status, ExecutionStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn progressing_state_does_not_trip() {
    let spec = Spec::new();
    spec.seed_state("n", json!(0));

    // Counter effect: state changes every frame, so the signature
    // changes and the guard stays quiet until the condition ends it.
    let component: Component = Arc::new(|ctx| {
        let n = ctx.state.get("n").and_then(Value::as_i64).unwrap_or(0);
        if n >= 5 {
            return Node::End;
        }
        Node::fragment(vec![Node::Effect(sm_core::EffectNode::new(
            Some(vec![json!(n)]),
            Arc::new(move |hctx| {
                hctx.state_set("n", json!(n + 1));
                None
            }),
        ))])
    });
    let mut tick = spec.tick_loop(component);

    let status = tick.run().await.unwrap();
    assert_eq!(status, ExecutionStatus::Completed);
    assert_eq!(spec.state_value("n"), Some(json!(5)));
}
