// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row types shared by the table accessor modules

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sm_core::{ExecutionStatus, TaskStatus};

/// One queued store write. `value: None` deletes the key.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub key: String,
    pub value: Option<Value>,
    pub trigger: Option<String>,
    pub node_id: Option<String>,
    pub frame_id: Option<u64>,
}

impl WriteOp {
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        Self { key: key.into(), value: Some(value), trigger: None, node_id: None, frame_id: None }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self { key: key.into(), value: None, trigger: None, node_id: None, frame_id: None }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    pub fn with_context(mut self, node_id: Option<String>, frame_id: Option<u64>) -> Self {
        self.node_id = node_id;
        self.frame_id = frame_id;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRow {
    pub id: String,
    pub name: String,
    pub source_ref: Option<String>,
    pub config: Value,
    pub status: ExecutionStatus,
    pub stop_reason: Option<String>,
    pub iterations: u64,
    pub total_tokens: u64,
    pub total_tool_calls: u64,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRow {
    pub id: i64,
    pub execution_id: String,
    pub sequence: u64,
    pub plan_text: String,
    pub plan_hash: String,
    pub phase_marker: Option<String>,
    pub step_marker: Option<String>,
    pub mounted_ids: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: String,
    pub execution_id: String,
    pub name: String,
    pub status: TaskStatus,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<String>,
    pub heartbeat_at: Option<String>,
    pub retry_count: u32,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRow {
    pub id: String,
    pub execution_id: String,
    pub node_id: String,
    pub model: String,
    pub status: TaskStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub turns_used: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub output_text: Option<String>,
    pub output_structured: Option<Value>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: i64,
    pub execution_id: String,
    pub source: String,
    pub node_id: Option<String>,
    pub event_type: String,
    pub payload: Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRow {
    pub id: i64,
    pub execution_id: String,
    pub node_id: Option<String>,
    pub frame_id: Option<u64>,
    pub kind: String,
    pub name: String,
    pub key: Option<String>,
    pub content: Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
            ApprovalStatus::Expired => "expired",
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "denied" => Ok(ApprovalStatus::Denied),
            "expired" => Ok(ApprovalStatus::Expired),
            other => Err(format!("unknown approval status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRow {
    pub id: String,
    pub execution_id: String,
    pub node_id: String,
    pub kind: String,
    pub payload: Value,
    pub prompt: String,
    pub options: Vec<String>,
    pub status: ApprovalStatus,
    pub responder: Option<String>,
    pub response: Option<Value>,
    pub comment: Option<String>,
    pub requested_at: String,
    pub responded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRow {
    pub id: i64,
    pub execution_id: String,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub trigger: Option<String>,
    pub node_id: Option<String>,
    pub frame_id: Option<u64>,
    pub created_at: String,
}
