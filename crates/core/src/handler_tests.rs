// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn ctx() -> HandlerCtx {
    let mut state = HashMap::new();
    state.insert("present".to_string(), json!("yes"));
    HandlerCtx::new(state, HashMap::new(), 7, NodeId::new("n1"), "onFinished:n1", 1_000)
}

#[test]
fn reads_come_from_snapshot() {
    let ctx = ctx();
    assert_eq!(ctx.state_get("present"), Some(&json!("yes")));
    assert_eq!(ctx.state_get("absent"), None);
}

#[test]
fn writes_are_queued_not_applied() {
    let mut ctx = ctx();
    ctx.state_set("result", json!("hi"));
    // The snapshot is unchanged; the write sits in the queue.
    assert_eq!(ctx.state_get("result"), None);
    assert_eq!(ctx.pending_write_count(), 1);
}

#[test]
fn writes_carry_tier_and_trigger() {
    let mut ctx = ctx();
    ctx.state_set("a", json!(1));
    ctx.v_set("b", json!(2));
    ctx.state_delete("c");

    let (writes, _, _) = ctx.into_parts();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[0].tier, StoreTier::Durable);
    assert_eq!(writes[0].trigger, "onFinished:n1");
    assert_eq!(writes[1].tier, StoreTier::Volatile);
    assert_eq!(writes[2].value, None);
}

#[test]
fn artifacts_and_approvals_queue() {
    let mut ctx = ctx();
    ctx.markdown("report", "## done");
    ctx.request_approval(ApprovalSpec {
        kind: "deploy".to_string(),
        payload: json!({}),
        prompt: "ship it?".to_string(),
        options: vec!["yes".to_string(), "no".to_string()],
    });

    let (_, artifacts, approvals) = ctx.into_parts();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].kind, ArtifactKind::Markdown);
    assert!(artifacts[0].key.is_none());
    assert_eq!(approvals.len(), 1);
    assert_eq!(approvals[0].prompt, "ship it?");
}

#[test]
fn frame_metadata_is_exposed() {
    let ctx = ctx();
    assert_eq!(ctx.frame_id(), 7);
    assert_eq!(ctx.node_id(), &NodeId::new("n1"));
    assert_eq!(ctx.now_ms(), 1_000);
}
