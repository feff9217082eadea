// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler transactions and stale-result safety

use super::prelude::*;

#[tokio::test(start_paused = true)]
async fn handler_write_lands_with_its_trigger() {
    let spec = Spec::new();
    let component: Component = Arc::new(|_ctx| {
        Node::Claude(ClaudeNode::new("Say hi.").id("greeter").max_turns(1).on_finished(
            Arc::new(|result, ctx| {
                let text = result.output_text.clone().unwrap_or_default();
                ctx.state_set("result", json!(text));
                Ok(())
            }),
        ))
    });
    let mut tick = spec.tick_loop(component);

    let status = tick.run().await.unwrap();
    assert_eq!(status, ExecutionStatus::Completed);

    assert_eq!(spec.state_value("result"), Some(json!("hi")));

    let rows = transitions::list(&spec.db, spec.execution_id.as_str(), None, 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].trigger.as_deref(), Some("onFinished:greeter"));
}

#[tokio::test(start_paused = true)]
async fn failing_handler_persists_nothing() {
    let spec = Spec::new();
    let component: Component = Arc::new(|_ctx| {
        Node::Claude(ClaudeNode::new("p").id("greeter").max_turns(1).on_finished(Arc::new(
            |_result, ctx| {
                ctx.state_set("partial", json!(1));
                Err("handler blew up".into())
            },
        )))
    });
    let mut tick = spec.tick_loop(component);

    // Handler failure is handler-scoped, not execution-scoped.
    let status = tick.run().await.unwrap();
    assert_eq!(status, ExecutionStatus::Completed);

    assert_eq!(spec.state_value("partial"), None);
    assert_eq!(spec.transition_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_completion_fires_zero_handlers() {
    let spec = Spec::new();
    spec.seed_state("show", json!(true));
    spec.executor.complete_after("greeter", "late", Duration::from_millis(100));

    let component: Component = Arc::new(|ctx| {
        let show = ctx.state.get("show").and_then(Value::as_bool).unwrap_or(false);
        Node::when(
            show,
            vec![Node::Claude(ClaudeNode::new("p").id("greeter").max_turns(1).on_finished(
                Arc::new(|_result, ctx| {
                    ctx.state_set("handled", json!(true));
                    Ok(())
                }),
            ))],
        )
    });
    let mut tick = spec.tick_loop(component);
    tick.startup().unwrap();
    tick.tick_once().unwrap();

    // The agent completes while mounted; the tree then empties before
    // the engine applies the completion.
    tokio::time::sleep(Duration::from_millis(150)).await;
    spec.seed_state("show", json!(false));
    tick.request_rerender();
    tick.run_until_idle().await.unwrap();

    // Result row recorded, task completed, zero handler effects.
    let task = spec.task("greeter").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(spec.state_value("handled"), None);
    let handler_writes = transitions::list(&spec.db, spec.execution_id.as_str(), None, 50)
        .unwrap()
        .into_iter()
        .filter(|t| t.trigger.as_deref() != Some("spec:seed"))
        .count();
    assert_eq!(handler_writes, 0);
}
