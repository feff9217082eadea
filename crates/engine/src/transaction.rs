// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler transactions
//!
//! A handler runs against a fresh [`HandlerCtx`]; everything it queues
//! commits into the frame's action queue only if the handler returns
//! success. A failing handler rolls back completely and the failure is
//! recorded as an audit event. Other handlers in the same frame are
//! unaffected either way.

use serde_json::json;
use sm_core::{
    ActionKind, ActionQueue, ApprovalSpec, ArtifactRequest, HandlerCtx, HandlerError, NodeId,
    QueuedWrite,
};
use std::collections::HashMap;

/// What one handler invocation produced.
#[derive(Debug)]
pub struct HandlerOutcome {
    pub node_id: NodeId,
    pub handler_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub action_count: usize,
    pub artifacts: Vec<ArtifactRequest>,
    pub approvals: Vec<ApprovalSpec>,
}

impl HandlerOutcome {
    /// Audit payload stored in the events table.
    pub fn audit_payload(&self) -> serde_json::Value {
        json!({
            "handler": self.handler_name,
            "success": self.success,
            "error": self.error,
            "action_count": self.action_count,
        })
    }
}

/// Run one handler inside a transaction.
///
/// On success the queued writes land in `actions` with this task's id
/// (so conflict resolution orders them deterministically); artifacts
/// and approval requests are returned for the caller to apply. On
/// failure everything queued is dropped.
#[allow(clippy::too_many_arguments)]
pub fn run_handler_transaction(
    handler: impl FnOnce(&mut HandlerCtx) -> Result<(), HandlerError>,
    handler_name: &str,
    node_id: &NodeId,
    state_snapshot: HashMap<String, serde_json::Value>,
    volatile_snapshot: HashMap<String, serde_json::Value>,
    frame_id: u64,
    now_ms: u64,
    actions: &mut ActionQueue,
) -> HandlerOutcome {
    let trigger = format!("{handler_name}:{node_id}");
    let mut ctx = HandlerCtx::new(
        state_snapshot,
        volatile_snapshot,
        frame_id,
        node_id.clone(),
        trigger,
        now_ms,
    );

    match handler(&mut ctx) {
        Ok(()) => {
            let (writes, artifacts, approvals) = ctx.into_parts();
            let action_count = writes.len();
            for write in writes {
                commit_write(actions, write, node_id);
            }
            tracing::debug!(
                handler = handler_name,
                node_id = %node_id,
                actions = action_count,
                "handler committed"
            );
            HandlerOutcome {
                node_id: node_id.clone(),
                handler_name: handler_name.to_string(),
                success: true,
                error: None,
                action_count,
                artifacts,
                approvals,
            }
        }
        Err(error) => {
            // Rollback: the context (and everything queued in it) drops.
            tracing::warn!(
                handler = handler_name,
                node_id = %node_id,
                "handler failed, rolling back: {error}"
            );
            HandlerOutcome {
                node_id: node_id.clone(),
                handler_name: handler_name.to_string(),
                success: false,
                error: Some(error.to_string()),
                action_count: 0,
                artifacts: Vec::new(),
                approvals: Vec::new(),
            }
        }
    }
}

fn commit_write(actions: &mut ActionQueue, write: QueuedWrite, node_id: &NodeId) {
    let kind = match write.value {
        Some(value) => ActionKind::Set(value),
        None => ActionKind::Delete,
    };
    actions.enqueue(
        write.key,
        kind,
        write.tier,
        Some(write.trigger),
        Some(node_id.clone()),
        Some(node_id.clone()),
    );
}

/// Convenience used by effects: same transaction semantics, different
/// trigger shape.
pub fn run_effect_transaction(
    setup_writes: Vec<QueuedWrite>,
    node_id: &NodeId,
    actions: &mut ActionQueue,
) -> usize {
    let count = setup_writes.len();
    for write in setup_writes {
        commit_write(actions, write, node_id);
    }
    count
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;
