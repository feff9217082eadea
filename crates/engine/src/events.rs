// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event system: completion dispatch with stale-result protection
//!
//! Handlers only fire for nodes that are still mounted when their task
//! completes. Each invocation runs in a handler transaction; every
//! invocation (success or failure) leaves an audit row.

use crate::transaction::{run_handler_transaction, HandlerOutcome};
use serde_json::Value;
use sm_core::{ActionQueue, AgentResult, HandlerBundle, Node, NodeId, TaskStatus};
use std::collections::{BTreeMap, HashMap};

/// Dispatches terminal-status handlers for mounted runnable nodes.
#[derive(Default)]
pub struct EventSystem {
    mounted: BTreeMap<NodeId, Node>,
}

impl EventSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mounted-node view. Called by reconcile each frame.
    pub fn update_mounted(&mut self, mounted: BTreeMap<NodeId, Node>) {
        self.mounted = mounted;
    }

    pub fn is_mounted(&self, node_id: &NodeId) -> bool {
        self.mounted.contains_key(node_id)
    }

    /// Dispatch handlers for one completed task. Returns the outcomes
    /// (empty when the node is unmounted, has no handlers, or the task
    /// was cancelled).
    #[allow(clippy::too_many_arguments)]
    pub fn handle_completion(
        &self,
        node_id: &NodeId,
        result: &AgentResult,
        state_snapshot: &HashMap<String, Value>,
        volatile_snapshot: &HashMap<String, Value>,
        frame_id: u64,
        now_ms: u64,
        actions: &mut ActionQueue,
    ) -> Vec<HandlerOutcome> {
        let Some(node) = self.mounted.get(node_id) else {
            tracing::debug!(node_id = %node_id, "stale result, skipping handlers");
            return Vec::new();
        };
        let Some(handlers) = node.handlers() else {
            return Vec::new();
        };

        // Cancelled tasks are recorded for audit but never dispatched.
        if result.status == TaskStatus::Cancelled {
            return Vec::new();
        }

        let mut outcomes = Vec::new();
        match result.status {
            TaskStatus::Completed => {
                if let Some(handler) = &handlers.on_finished {
                    let handler = std::sync::Arc::clone(handler);
                    outcomes.push(run_handler_transaction(
                        move |ctx| handler(result, ctx),
                        "onFinished",
                        node_id,
                        state_snapshot.clone(),
                        volatile_snapshot.clone(),
                        frame_id,
                        now_ms,
                        actions,
                    ));
                }
                outcomes.extend(self.dispatch_named(
                    handlers,
                    node_id,
                    result,
                    state_snapshot,
                    volatile_snapshot,
                    frame_id,
                    now_ms,
                    actions,
                ));
            }
            TaskStatus::Failed => {
                if let Some(handler) = &handlers.on_error {
                    let handler = std::sync::Arc::clone(handler);
                    outcomes.push(run_handler_transaction(
                        move |ctx| handler(result, ctx),
                        "onError",
                        node_id,
                        state_snapshot.clone(),
                        volatile_snapshot.clone(),
                        frame_id,
                        now_ms,
                        actions,
                    ));
                }
            }
            _ => {}
        }

        outcomes
    }

    /// Author-defined handlers fire after onFinished, in name order.
    #[allow(clippy::too_many_arguments)]
    fn dispatch_named(
        &self,
        handlers: &HandlerBundle,
        node_id: &NodeId,
        result: &AgentResult,
        state_snapshot: &HashMap<String, Value>,
        volatile_snapshot: &HashMap<String, Value>,
        frame_id: u64,
        now_ms: u64,
        actions: &mut ActionQueue,
    ) -> Vec<HandlerOutcome> {
        let mut outcomes = Vec::new();
        for (name, handler) in handlers.named() {
            let handler = std::sync::Arc::clone(handler);
            outcomes.push(run_handler_transaction(
                move |ctx| handler(result, ctx),
                name,
                node_id,
                state_snapshot.clone(),
                volatile_snapshot.clone(),
                frame_id,
                now_ms,
                actions,
            ));
        }
        outcomes
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
