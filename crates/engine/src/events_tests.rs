// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use sm_core::ClaudeNode;
use std::sync::Arc;

fn mounted_agent(node_id: &str, node: ClaudeNode) -> EventSystem {
    let mut system = EventSystem::new();
    let mut mounted = BTreeMap::new();
    mounted.insert(NodeId::new(node_id), Node::Claude(node));
    system.update_mounted(mounted);
    system
}

fn completed(node_id: &str, text: &str) -> AgentResult {
    AgentResult::completed(NodeId::new(node_id), "sonnet", Utc::now(), text)
}

#[test]
fn on_finished_fires_for_mounted_node() {
    let node = ClaudeNode::new("p").on_finished(Arc::new(|result, ctx| {
        let text = result.output_text.clone().unwrap_or_default();
        ctx.state_set("result", json!(text));
        Ok(())
    }));
    let system = mounted_agent("n1", node);

    let mut actions = ActionQueue::new();
    let outcomes = system.handle_completion(
        &NodeId::new("n1"),
        &completed("n1", "hi"),
        &HashMap::new(),
        &HashMap::new(),
        1,
        0,
        &mut actions,
    );

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].success);
    assert_eq!(actions.len(), 1);
}

#[test]
fn unmounted_node_skips_handlers_silently() {
    let fired = Arc::new(Mutex::new(false));
    let fired_clone = Arc::clone(&fired);
    let node = ClaudeNode::new("p").on_finished(Arc::new(move |_r, _c| {
        *fired_clone.lock() = true;
        Ok(())
    }));
    let system = mounted_agent("other", node);

    let mut actions = ActionQueue::new();
    let outcomes = system.handle_completion(
        &NodeId::new("n1"),
        &completed("n1", "hi"),
        &HashMap::new(),
        &HashMap::new(),
        1,
        0,
        &mut actions,
    );

    assert!(outcomes.is_empty());
    assert!(!*fired.lock());
    assert!(!actions.has_pending());
}

#[test]
fn error_result_fires_on_error_only() {
    let which = Arc::new(Mutex::new(Vec::<&str>::new()));
    let finished_log = Arc::clone(&which);
    let error_log = Arc::clone(&which);
    let node = ClaudeNode::new("p")
        .on_finished(Arc::new(move |_r, _c| {
            finished_log.lock().push("finished");
            Ok(())
        }))
        .on_error(Arc::new(move |_r, _c| {
            error_log.lock().push("error");
            Ok(())
        }));
    let system = mounted_agent("n1", node);

    let failed = AgentResult::failed(NodeId::new("n1"), "sonnet", Utc::now(), "boom", false);
    let mut actions = ActionQueue::new();
    system.handle_completion(
        &NodeId::new("n1"),
        &failed,
        &HashMap::new(),
        &HashMap::new(),
        1,
        0,
        &mut actions,
    );

    assert_eq!(*which.lock(), vec!["error"]);
}

#[test]
fn cancelled_result_fires_nothing() {
    let fired = Arc::new(Mutex::new(false));
    let fired_clone = Arc::clone(&fired);
    let node = ClaudeNode::new("p").on_finished(Arc::new(move |_r, _c| {
        *fired_clone.lock() = true;
        Ok(())
    }));
    let system = mounted_agent("n1", node);

    let mut result = completed("n1", "late");
    result.status = sm_core::TaskStatus::Cancelled;
    let mut actions = ActionQueue::new();
    let outcomes = system.handle_completion(
        &NodeId::new("n1"),
        &result,
        &HashMap::new(),
        &HashMap::new(),
        1,
        0,
        &mut actions,
    );
    assert!(outcomes.is_empty());
    assert!(!*fired.lock());
}

#[test]
fn named_handlers_fire_after_on_finished_in_name_order() {
    let order = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut node = ClaudeNode::new("p");
    let log = Arc::clone(&order);
    node.handlers.on_finished = Some(Arc::new(move |_r, _c| {
        log.lock().push("onFinished".to_string());
        Ok(())
    }));
    for name in ["onZeta", "onAlpha"] {
        let log = Arc::clone(&order);
        let name_owned = name.to_string();
        node.handlers
            .set_named(
                name,
                Arc::new(move |_r, _c| {
                    log.lock().push(name_owned.clone());
                    Ok(())
                }),
            )
            .unwrap();
    }
    let system = mounted_agent("n1", node);

    let mut actions = ActionQueue::new();
    system.handle_completion(
        &NodeId::new("n1"),
        &completed("n1", "x"),
        &HashMap::new(),
        &HashMap::new(),
        1,
        0,
        &mut actions,
    );

    assert_eq!(*order.lock(), vec!["onFinished", "onAlpha", "onZeta"]);
}

#[test]
fn failing_handler_isolated_from_siblings() {
    let node = ClaudeNode::new("p").on_finished(Arc::new(|_r, _c| Err("nope".into())));
    let mut with_named = node;
    with_named
        .handlers
        .set_named(
            "onNext",
            Arc::new(|_r, ctx| {
                ctx.state_set("survived", json!(true));
                Ok(())
            }),
        )
        .unwrap();
    let system = mounted_agent("n1", with_named);

    let mut actions = ActionQueue::new();
    let outcomes = system.handle_completion(
        &NodeId::new("n1"),
        &completed("n1", "x"),
        &HashMap::new(),
        &HashMap::new(),
        1,
        0,
        &mut actions,
    );

    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].success);
    assert!(outcomes[1].success);
    assert_eq!(actions.len(), 1);
}
