// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine events surfaced to the control stream
//!
//! Everything the outside world may subscribe to flows through this
//! enum: frame commits, node/task status changes, streamed agent
//! output, approval requests, execution status transitions, and plan
//! lint warnings.

use crate::agent::{ExecutionStatus, TaskStatus};
use crate::id::{ApprovalId, ExecutionId, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    FrameCreated {
        execution_id: ExecutionId,
        sequence: u64,
        plan_hash: String,
    },
    NodeUpdated {
        execution_id: ExecutionId,
        node_id: NodeId,
        status: TaskStatus,
    },
    TaskUpdated {
        execution_id: ExecutionId,
        task_id: NodeId,
        status: TaskStatus,
        retry_count: u32,
    },
    AgentStream {
        execution_id: ExecutionId,
        node_id: NodeId,
        kind: String,
        payload: Value,
    },
    ApprovalRequested {
        execution_id: ExecutionId,
        approval_id: ApprovalId,
        node_id: NodeId,
        prompt: String,
    },
    ExecutionStatus {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
    PlanWarning {
        execution_id: ExecutionId,
        rule: String,
        message: String,
        node_id: NodeId,
    },
}

impl EngineEvent {
    /// Notification method name on the control stream.
    pub fn method(&self) -> &'static str {
        match self {
            EngineEvent::FrameCreated { .. } => "frame.created",
            EngineEvent::NodeUpdated { .. } => "node.updated",
            EngineEvent::TaskUpdated { .. } => "task.updated",
            EngineEvent::AgentStream { .. } => "agent.stream",
            EngineEvent::ApprovalRequested { .. } => "approval.requested",
            EngineEvent::ExecutionStatus { .. } => "execution.status",
            EngineEvent::PlanWarning { .. } => "plan.warning",
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            EngineEvent::FrameCreated { execution_id, .. }
            | EngineEvent::NodeUpdated { execution_id, .. }
            | EngineEvent::TaskUpdated { execution_id, .. }
            | EngineEvent::AgentStream { execution_id, .. }
            | EngineEvent::ApprovalRequested { execution_id, .. }
            | EngineEvent::ExecutionStatus { execution_id, .. }
            | EngineEvent::PlanWarning { execution_id, .. } => execution_id,
        }
    }

    /// Key-value pairs for structured logging
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            EngineEvent::FrameCreated { sequence, plan_hash, .. } => vec![
                ("sequence", sequence.to_string()),
                ("plan_hash", crate::id::short(plan_hash, 12).to_string()),
            ],
            EngineEvent::NodeUpdated { node_id, status, .. } => {
                vec![("node_id", node_id.to_string()), ("status", status.as_str().to_string())]
            }
            EngineEvent::TaskUpdated { task_id, status, retry_count, .. } => vec![
                ("task_id", task_id.to_string()),
                ("status", status.as_str().to_string()),
                ("retry_count", retry_count.to_string()),
            ],
            EngineEvent::AgentStream { node_id, kind, .. } => {
                vec![("node_id", node_id.to_string()), ("kind", kind.clone())]
            }
            EngineEvent::ApprovalRequested { approval_id, node_id, .. } => vec![
                ("approval_id", approval_id.to_string()),
                ("node_id", node_id.to_string()),
            ],
            EngineEvent::ExecutionStatus { status, stop_reason, .. } => {
                let mut fields = vec![("status", status.as_str().to_string())];
                if let Some(reason) = stop_reason {
                    fields.push(("stop_reason", reason.clone()));
                }
                fields
            }
            EngineEvent::PlanWarning { rule, node_id, .. } => {
                vec![("rule", rule.clone()), ("node_id", node_id.to_string())]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_are_stable() {
        let exec = ExecutionId::from_string("e1");
        let cases: Vec<(EngineEvent, &str)> = vec![
            (
                EngineEvent::FrameCreated {
                    execution_id: exec.clone(),
                    sequence: 1,
                    plan_hash: "abc".to_string(),
                },
                "frame.created",
            ),
            (
                EngineEvent::TaskUpdated {
                    execution_id: exec.clone(),
                    task_id: NodeId::new("n"),
                    status: TaskStatus::Running,
                    retry_count: 0,
                },
                "task.updated",
            ),
            (
                EngineEvent::ExecutionStatus {
                    execution_id: exec.clone(),
                    status: ExecutionStatus::Completed,
                    stop_reason: None,
                },
                "execution.status",
            ),
        ];
        for (event, method) in cases {
            assert_eq!(event.method(), method);
            assert_eq!(event.execution_id(), &exec);
        }
    }

    #[test]
    fn events_roundtrip_json() {
        let event = EngineEvent::AgentStream {
            execution_id: ExecutionId::from_string("e1"),
            node_id: NodeId::new("n1"),
            kind: "token".to_string(),
            payload: serde_json::json!({"text": "hi"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: EngineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn fields_for_logging() {
        let event = EngineEvent::ExecutionStatus {
            execution_id: ExecutionId::from_string("e1"),
            status: ExecutionStatus::Failed,
            stop_reason: Some("frame storm".to_string()),
        };
        assert_eq!(
            event.fields(),
            vec![
                ("status", "failed".to_string()),
                ("stop_reason", "frame storm".to_string()),
            ]
        );
    }
}
