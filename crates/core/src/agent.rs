// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent execution result and status types

use crate::id::{NodeId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a task (one runnable-node invocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
    Orphaned,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Cancelled | TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Orphaned
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Cancelling => "cancelling",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Orphaned => "orphaned",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "cancelling" => Ok(TaskStatus::Cancelling),
            "cancelled" => Ok(TaskStatus::Cancelled),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "orphaned" => Ok(TaskStatus::Orphaned),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Status of a top-level execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Token usage for one agent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: TokenUsage) {
        *self = *self + other;
    }
}

/// Record of a single tool call made during an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Progress event emitted while an agent run streams.
///
/// `kind` is an open tag ("token", "tool_start", "tool_end", "thinking");
/// the payload is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub kind: String,
    pub payload: Value,
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        Self { kind: "token".to_string(), payload: serde_json::json!({ "text": text.into() }) }
    }
}

/// Terminal result of one agent run.
///
/// Exactly one of these ends every execute stream; the engine rejects a
/// second terminal item as a protocol error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub status: TaskStatus,
    pub model: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub turns_used: u32,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_structured: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Whether the failure was classified retryable (only meaningful on
    /// status=failed).
    #[serde(default)]
    pub retryable: bool,
}

impl AgentResult {
    /// A completed result with the given output text.
    pub fn completed(
        node_id: NodeId,
        model: impl Into<String>,
        started_at: DateTime<Utc>,
        output_text: impl Into<String>,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            node_id,
            status: TaskStatus::Completed,
            model: model.into(),
            started_at,
            ended_at: Some(started_at),
            turns_used: 1,
            usage: TokenUsage::default(),
            output_text: Some(output_text.into()),
            output_structured: None,
            tool_calls: Vec::new(),
            error_message: None,
            retryable: false,
        }
    }

    /// A failed result with the given error message.
    pub fn failed(
        node_id: NodeId,
        model: impl Into<String>,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            node_id,
            status: TaskStatus::Failed,
            model: model.into(),
            started_at,
            ended_at: Some(started_at),
            turns_used: 0,
            usage: TokenUsage::default(),
            output_text: None,
            output_structured: None,
            tool_calls: Vec::new(),
            error_message: Some(error.into()),
            retryable,
        }
    }

    pub fn tool_call_count(&self) -> u64 {
        self.tool_calls.len() as u64
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
