// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent executor contract
//!
//! An executor turns one mounted runnable node into an async stream of
//! events: zero or more progress items, then exactly one terminal
//! result. The engine enforces the single-terminal invariant and
//! observes the cancel signal between items.

use crate::error::BackendError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;
use sm_core::{AgentResult, ExecutionId, NodeId, StreamEvent};

/// One item of an execute stream.
#[derive(Debug, Clone)]
pub enum ExecEvent {
    Progress(StreamEvent),
    Done(AgentResult),
}

pub type EventStream = BoxStream<'static, ExecEvent>;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub node_id: NodeId,
    pub execution_id: ExecutionId,
    pub prompt: String,
    pub model: String,
    pub max_turns: u32,
    /// Opaque backend options (tools, schemas, resume hints).
    pub options: Value,
}

impl ExecRequest {
    pub fn new(
        node_id: NodeId,
        execution_id: ExecutionId,
        prompt: impl Into<String>,
        model: impl Into<String>,
        max_turns: u32,
    ) -> Self {
        Self {
            node_id,
            execution_id,
            prompt: prompt.into(),
            model: model.into(),
            max_turns,
            options: Value::Null,
        }
    }
}

/// Opaque agent backend.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Start one run. The returned stream yields progress events and
    /// ends with one terminal [`AgentResult`]; the stream must observe
    /// cancellation at every suspension point of its own loop.
    async fn execute(&self, request: ExecRequest) -> Result<EventStream, BackendError>;
}
