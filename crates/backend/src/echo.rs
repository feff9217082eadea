// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Echo executor
//!
//! Stand-in backend wired by the CLI when no remote agent runner is
//! configured: streams the prompt back as one token and completes.
//! Deployments embed the engine as a library and supply their own
//! [`AgentExecutor`](crate::AgentExecutor).

use crate::error::BackendError;
use crate::executor::{AgentExecutor, EventStream, ExecEvent, ExecRequest};
use async_trait::async_trait;
use chrono::Utc;
use sm_core::{AgentResult, StreamEvent};

#[derive(Debug, Default, Clone)]
pub struct EchoExecutor;

#[async_trait]
impl AgentExecutor for EchoExecutor {
    async fn execute(&self, request: ExecRequest) -> Result<EventStream, BackendError> {
        let token = StreamEvent::token(&request.prompt);
        let result = AgentResult::completed(
            request.node_id.clone(),
            request.model.clone(),
            Utc::now(),
            format!("echo: {}", request.prompt),
        );
        Ok(Box::pin(futures_util::stream::iter(vec![
            ExecEvent::Progress(token),
            ExecEvent::Done(result),
        ])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use sm_core::{ExecutionId, NodeId};

    #[tokio::test]
    async fn echoes_prompt_as_token_then_completes() {
        let executor = EchoExecutor;
        let request = ExecRequest::new(
            NodeId::new("n1"),
            ExecutionId::from_string("e1"),
            "Say hi.",
            "sonnet",
            1,
        );
        let events: Vec<ExecEvent> =
            executor.execute(request).await.unwrap().collect().await;
        assert_eq!(events.len(), 2);
        let ExecEvent::Progress(token) = &events[0] else { panic!("expected token") };
        assert_eq!(token.payload["text"], "Say hi.");
        let ExecEvent::Done(result) = &events[1] else { panic!("expected terminal") };
        assert_eq!(result.output_text.as_deref(), Some("echo: Say hi."));
    }
}
