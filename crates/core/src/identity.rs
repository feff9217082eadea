// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic node identity and cross-frame reconciliation
//!
//! Identity is content-addressed: the node's path from the root (parent
//! id, key-or-index, type tag) is SHA-256 hashed and truncated. Two
//! processes walking the same tree always assign the same ids, which is
//! what makes resume and the task table meaningful across restarts.

use crate::id::NodeId;
use crate::node::Node;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Compute the stable ID for one node.
///
/// Precedence: explicit `id` prop, else the SHA-256 digest of
/// `"{parent_or_root}/{key_or_index}:{type}"` truncated to 12 hex chars.
pub fn compute_node_id(
    parent_id: Option<&NodeId>,
    key_or_index: &str,
    node_type: &str,
    explicit_id: Option<&str>,
) -> NodeId {
    if let Some(id) = explicit_id {
        return NodeId::new(id);
    }

    let parent = parent_id.map(NodeId::as_str).unwrap_or("root");
    let path = format!("{parent}/{key_or_index}:{node_type}");
    let digest = Sha256::digest(path.as_bytes());
    let mut hex = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        hex.push_str(&format!("{byte:02x}"));
    }
    NodeId::new(hex)
}

/// Deterministic signature of the execution parameters, used to detect
/// incompatible resumes.
pub fn compute_execution_signature(
    script_hash: &str,
    engine_version: &str,
    schema_version: i64,
) -> String {
    let combined = format!("{script_hash}|{engine_version}|{schema_version}");
    let digest = Sha256::digest(combined.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Context compared when resuming a saved execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeContext {
    pub script_hash: String,
    pub engine_version: String,
    pub schema_version: i64,
}

/// Compare resume contexts. Mismatches are warnings, not errors: the
/// resume proceeds, but identity may not line up.
pub fn validate_resume(saved: &ResumeContext, current: &ResumeContext) -> Vec<String> {
    let mut warnings = Vec::new();
    if saved.script_hash != current.script_hash {
        warnings.push("script changed since last run; node identity may not match".to_string());
    }
    if saved.engine_version != current.engine_version {
        warnings.push(format!(
            "engine version mismatch: {} vs {}",
            saved.engine_version, current.engine_version
        ));
    }
    if saved.schema_version != current.schema_version {
        warnings.push(format!(
            "schema version mismatch: {} vs {}",
            saved.schema_version, current.schema_version
        ));
    }
    warnings
}

/// A node annotated with its computed identity and position.
#[derive(Debug, Clone)]
pub struct MountedNode {
    pub node: Node,
    pub node_id: NodeId,
    pub parent_id: Option<NodeId>,
    pub child_index: usize,
}

/// Recursively assign stable IDs to a plan tree.
///
/// Returns the root's id and an ordered map of every live node. Children
/// behind a false conditional are not walked and so never mount.
pub fn assign_node_ids(root: &Node) -> (NodeId, BTreeMap<NodeId, MountedNode>) {
    let mut id_map = BTreeMap::new();
    let root_id = assign(root, None, 0, &mut id_map);
    (root_id, id_map)
}

fn assign(
    node: &Node,
    parent_id: Option<&NodeId>,
    child_index: usize,
    id_map: &mut BTreeMap<NodeId, MountedNode>,
) -> NodeId {
    let index_str;
    let key_or_index = match node.key() {
        Some(key) => key,
        None => {
            index_str = child_index.to_string();
            &index_str
        }
    };

    let node_id = compute_node_id(parent_id, key_or_index, node.type_tag(), node.explicit_id());

    id_map.insert(
        node_id.clone(),
        MountedNode {
            node: node.clone(),
            node_id: node_id.clone(),
            parent_id: parent_id.cloned(),
            child_index,
        },
    );

    for (i, child) in node.active_children().iter().enumerate() {
        assign(child, Some(&node_id), i, id_map);
    }

    node_id
}

/// Result of reconciling the current frame against the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Ids present now but not last frame; runnable ones start tasks.
    pub newly_mounted: Vec<NodeId>,
    /// Ids in both frames whose tasks are still active.
    pub still_running: Vec<NodeId>,
    /// Ids gone this frame; running tasks get a cancel request.
    pub unmounted: Vec<NodeId>,
}

/// Diff two id maps. All output lists are id-sorted so downstream
/// handler dispatch is deterministic.
pub fn reconcile(
    current: &BTreeMap<NodeId, MountedNode>,
    previous: &BTreeMap<NodeId, MountedNode>,
    running: &BTreeSet<NodeId>,
) -> ReconcileResult {
    let newly_mounted =
        current.keys().filter(|id| !previous.contains_key(*id)).cloned().collect();
    let unmounted = previous.keys().filter(|id| !current.contains_key(*id)).cloned().collect();
    let still_running = current
        .keys()
        .filter(|id| previous.contains_key(*id) && running.contains(*id))
        .cloned()
        .collect();

    ReconcileResult { newly_mounted, still_running, unmounted }
}

/// Tracks node identity across frames.
#[derive(Debug, Default)]
pub struct NodeIdentityTracker {
    previous: BTreeMap<NodeId, MountedNode>,
    current: BTreeMap<NodeId, MountedNode>,
    running: BTreeSet<NodeId>,
}

impl NodeIdentityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign ids to the new tree and reconcile against the previous
    /// frame. Unmounted nodes leave the running set here; cancellation
    /// is the caller's job.
    pub fn update_for_frame(&mut self, root: &Node) -> ReconcileResult {
        let (_, current) = assign_node_ids(root);
        self.current = current;

        let result = reconcile(&self.current, &self.previous, &self.running);

        for id in &result.unmounted {
            self.running.remove(id);
        }
        self.previous = self.current.clone();

        result
    }

    /// Mark a node as having a running task.
    pub fn mark_running(&mut self, node_id: &NodeId) {
        self.running.insert(node_id.clone());
    }

    /// Mark a node's task completed. Returns true if the node is still
    /// mounted (handlers may fire); false means the result is stale.
    pub fn mark_completed(&mut self, node_id: &NodeId) -> bool {
        self.running.remove(node_id);
        self.current.contains_key(node_id)
    }

    pub fn is_mounted(&self, node_id: &NodeId) -> bool {
        self.current.contains_key(node_id)
    }

    pub fn get_node(&self, node_id: &NodeId) -> Option<&MountedNode> {
        self.current.get(node_id)
    }

    pub fn mounted(&self) -> &BTreeMap<NodeId, MountedNode> {
        &self.current
    }

    pub fn running(&self) -> &BTreeSet<NodeId> {
        &self.running
    }

    pub fn mounted_ids(&self) -> Vec<NodeId> {
        self.current.keys().cloned().collect()
    }

    /// Drop a node from the previous-frame view so the next reconcile
    /// reports it newly mounted (manual task retry).
    pub fn forget(&mut self, node_id: &NodeId) {
        self.previous.remove(node_id);
        self.running.remove(node_id);
    }
}

/// Non-fatal plan issue surfaced through the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintWarning {
    pub rule: &'static str,
    pub message: String,
    pub node_id: NodeId,
    pub severity: &'static str,
}

/// Lints plan trees for common authoring mistakes.
#[derive(Debug, Default)]
pub struct PlanLinter;

impl PlanLinter {
    pub fn lint(&self, id_map: &BTreeMap<NodeId, MountedNode>) -> Vec<LintWarning> {
        let mut warnings = Vec::new();

        for (node_id, mounted) in id_map {
            let node = &mounted.node;

            if node.is_runnable() && node.explicit_id().is_none() && node.key().is_none() {
                warnings.push(LintWarning {
                    rule: "runnable-needs-id",
                    message: format!(
                        "runnable node '{}' at {} lacks an explicit id",
                        node.type_tag(),
                        node_id
                    ),
                    node_id: node_id.clone(),
                    severity: "warning",
                });
            }

            let missing_max = match node {
                Node::Ralph(n) => n.max_iterations.is_none(),
                Node::While(n) => n.max_iterations.is_none(),
                _ => false,
            };
            if missing_max {
                warnings.push(LintWarning {
                    rule: "loop-needs-max",
                    message: format!("loop at {node_id} has no configured max_iterations"),
                    node_id: node_id.clone(),
                    severity: "warning",
                });
            }

            if let Node::Claude(n) = node {
                if n.max_turns.is_none() {
                    warnings.push(LintWarning {
                        rule: "agent-needs-max-turns",
                        message: format!("agent at {node_id} uses the default turn limit"),
                        node_id: node_id.clone(),
                        severity: "info",
                    });
                }
            }
        }

        warnings
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
