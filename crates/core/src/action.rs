// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame-scoped action queue and deterministic conflict resolution
//!
//! Handlers and effects never write to a store. They enqueue actions;
//! the flush phase sorts them by `(frame_id, task_id, action_index)`,
//! folds the actions per key into one final value, and writes one
//! transition record per changed key.

use crate::handler::StoreTier;
use crate::id::NodeId;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reducer applied to the running value by an update action.
pub type Reducer = Arc<dyn Fn(Option<Value>) -> Value + Send + Sync>;

/// The mutation an action performs.
#[derive(Clone)]
pub enum ActionKind {
    Set(Value),
    Delete,
    Update(Reducer),
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Set(_) => "set",
            ActionKind::Delete => "delete",
            ActionKind::Update(_) => "update",
        }
    }
}

impl std::fmt::Debug for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Set(v) => f.debug_tuple("Set").field(v).finish(),
            ActionKind::Delete => f.write_str("Delete"),
            ActionKind::Update(_) => f.write_str("Update(..)"),
        }
    }
}

/// One queued state mutation.
#[derive(Debug, Clone)]
pub struct Action {
    pub key: String,
    pub kind: ActionKind,
    pub tier: StoreTier,
    pub trigger: Option<String>,
    pub frame_id: u64,
    pub task_id: Option<NodeId>,
    pub node_id: Option<NodeId>,
    pub action_index: u64,
}

impl Action {
    /// Deterministic ordering key. Absent task ids sort first.
    fn order_key(&self) -> (u64, &str, u64) {
        (self.frame_id, self.task_id.as_ref().map(NodeId::as_str).unwrap_or(""), self.action_index)
    }
}

/// Buffers actions for the current frame.
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: Vec<Action>,
    counter: u64,
    frame_id: u64,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the frame id stamped onto newly queued actions.
    pub fn set_frame_id(&mut self, frame_id: u64) {
        self.frame_id = frame_id;
    }

    pub fn enqueue(
        &mut self,
        key: impl Into<String>,
        kind: ActionKind,
        tier: StoreTier,
        trigger: Option<String>,
        task_id: Option<NodeId>,
        node_id: Option<NodeId>,
    ) {
        self.actions.push(Action {
            key: key.into(),
            kind,
            tier,
            trigger,
            frame_id: self.frame_id,
            task_id,
            node_id,
            action_index: self.counter,
        });
        self.counter += 1;
    }

    pub fn has_pending(&self) -> bool {
        !self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drain all actions in deterministic order.
    pub fn drain_sorted(&mut self) -> Vec<Action> {
        let mut actions = std::mem::take(&mut self.actions);
        actions.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        actions
    }

    /// Discard all pending actions without applying.
    pub fn rollback(&mut self) {
        self.actions.clear();
    }
}

/// Final value for one key after resolving a frame's actions.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub key: String,
    pub tier: StoreTier,
    /// None means the key ends up deleted.
    pub value: Option<Value>,
    /// Trigger of the last applied action, carried into the transition.
    pub trigger: Option<String>,
    pub node_id: Option<NodeId>,
}

/// Fold one key's ordered actions onto the current value.
///
/// `set` overwrites, `delete` clears, `update` chains its reducer on
/// the running value. Last write wins by construction.
pub fn resolve_conflicts(actions: &[Action], current: Option<Value>) -> Option<Resolved> {
    let last = actions.last()?;
    let mut value = current;
    let mut trigger = None;
    let mut node_id = None;

    for action in actions {
        match &action.kind {
            ActionKind::Set(v) => value = Some(v.clone()),
            ActionKind::Delete => value = None,
            ActionKind::Update(reducer) => value = Some(reducer(value.take())),
        }
        trigger = action.trigger.clone();
        node_id = action.node_id.clone();
    }

    Some(Resolved { key: last.key.clone(), tier: last.tier, value, trigger, node_id })
}

/// Group sorted actions by key, preserving order within each group.
pub fn group_by_key(actions: Vec<Action>) -> BTreeMap<String, Vec<Action>> {
    let mut groups: BTreeMap<String, Vec<Action>> = BTreeMap::new();
    for action in actions {
        groups.entry(action.key.clone()).or_default().push(action);
    }
    groups
}

/// Append-only audit row written alongside every committed change.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransitionRecord {
    pub execution_id: String,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub trigger: Option<String>,
    pub node_id: Option<NodeId>,
    pub frame_id: u64,
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
