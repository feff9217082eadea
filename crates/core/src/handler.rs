// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue-only context handed to handlers and effect setups
//!
//! Nothing a handler does touches a store directly. Reads come from the
//! frame snapshot; writes, artifacts, and approval requests are queued
//! and committed by the handler transaction only if the handler returns
//! success.

use crate::id::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Which store a queued write targets. Chosen per write, not per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreTier {
    Durable,
    Volatile,
}

/// A single queued state write. `value: None` deletes the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedWrite {
    pub key: String,
    pub value: Option<Value>,
    pub tier: StoreTier,
    pub trigger: String,
}

/// Artifact kinds surfaced to inspection UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Markdown,
    Table,
    Progress,
    Link,
    Image,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Markdown => "markdown",
            ArtifactKind::Table => "table",
            ArtifactKind::Progress => "progress",
            ArtifactKind::Link => "link",
            ArtifactKind::Image => "image",
        }
    }
}

/// A queued artifact write. Keyed artifacts upsert; keyless append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    pub kind: ArtifactKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub content: Value,
}

/// A queued approval request. Resolution happens outside the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSpec {
    pub kind: String,
    pub payload: Value,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Error returned by a failing handler; aborts its transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Context passed to completion/error handlers and effect setups.
pub struct HandlerCtx {
    state_snapshot: HashMap<String, Value>,
    volatile_snapshot: HashMap<String, Value>,
    frame_id: u64,
    node_id: NodeId,
    trigger: String,
    now_ms: u64,
    writes: Vec<QueuedWrite>,
    artifacts: Vec<ArtifactRequest>,
    approvals: Vec<ApprovalSpec>,
}

impl HandlerCtx {
    pub fn new(
        state_snapshot: HashMap<String, Value>,
        volatile_snapshot: HashMap<String, Value>,
        frame_id: u64,
        node_id: NodeId,
        trigger: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            state_snapshot,
            volatile_snapshot,
            frame_id,
            node_id,
            trigger: trigger.into(),
            writes: Vec::new(),
            artifacts: Vec::new(),
            approvals: Vec::new(),
            now_ms,
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Frame-frozen wall clock, milliseconds since the epoch.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Read a durable state key from the frame snapshot.
    pub fn state_get(&self, key: &str) -> Option<&Value> {
        self.state_snapshot.get(key)
    }

    /// Queue a durable state write.
    pub fn state_set(&mut self, key: impl Into<String>, value: Value) {
        self.push_write(key.into(), Some(value), StoreTier::Durable);
    }

    /// Queue a durable state delete.
    pub fn state_delete(&mut self, key: impl Into<String>) {
        self.push_write(key.into(), None, StoreTier::Durable);
    }

    /// Read a volatile key from the frame snapshot.
    pub fn v_get(&self, key: &str) -> Option<&Value> {
        self.volatile_snapshot.get(key)
    }

    /// Queue a volatile write.
    pub fn v_set(&mut self, key: impl Into<String>, value: Value) {
        self.push_write(key.into(), Some(value), StoreTier::Volatile);
    }

    /// Queue a volatile delete.
    pub fn v_delete(&mut self, key: impl Into<String>) {
        self.push_write(key.into(), None, StoreTier::Volatile);
    }

    fn push_write(&mut self, key: String, value: Option<Value>, tier: StoreTier) {
        self.writes.push(QueuedWrite { key, value, tier, trigger: self.trigger.clone() });
    }

    /// Queue an artifact write.
    pub fn artifact(&mut self, request: ArtifactRequest) {
        self.artifacts.push(request);
    }

    /// Queue a markdown artifact.
    pub fn markdown(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.artifacts.push(ArtifactRequest {
            kind: ArtifactKind::Markdown,
            name: name.into(),
            key: None,
            content: Value::String(text.into()),
        });
    }

    /// Queue an approval request to be created after commit.
    pub fn request_approval(&mut self, spec: ApprovalSpec) {
        self.approvals.push(spec);
    }

    pub fn pending_write_count(&self) -> usize {
        self.writes.len()
    }

    /// Drain everything queued. Called by the handler transaction on
    /// success; rollback simply drops the context.
    pub fn into_parts(self) -> (Vec<QueuedWrite>, Vec<ArtifactRequest>, Vec<ApprovalSpec>) {
        (self.writes, self.artifacts, self.approvals)
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
