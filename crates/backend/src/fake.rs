// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted executor for tests
//!
//! Behaves per node id: complete with text (default "hi"), stream
//! tokens first, fail, or hang until cancelled. Requests are recorded
//! so tests can assert what the engine asked for.

use crate::error::BackendError;
use crate::executor::{AgentExecutor, EventStream, ExecEvent, ExecRequest};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sm_core::{AgentResult, StreamEvent, TaskStatus};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Script {
    Complete { text: String, tokens: Vec<String>, delay: Duration },
    Fail { message: String, retryable: bool, fail_times: Option<u32> },
    /// `execute` itself errors for the first `times` attempts, then
    /// completes with "ok".
    ExecuteError { error: BackendError, times: u32 },
    Hang,
    /// Contract violation: two terminal results in one stream.
    DoubleTerminal,
}

#[derive(Default)]
pub struct FakeExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    attempts: Mutex<HashMap<String, u32>>,
    requests: Mutex<Vec<ExecRequest>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node completes immediately with `text`.
    pub fn complete_with(&self, node_id: &str, text: &str) {
        self.scripts.lock().insert(
            node_id.to_string(),
            Script::Complete { text: text.to_string(), tokens: Vec::new(), delay: Duration::ZERO },
        );
    }

    /// Node streams `tokens` then completes with `text`.
    pub fn stream_then_complete(&self, node_id: &str, tokens: &[&str], text: &str) {
        self.scripts.lock().insert(
            node_id.to_string(),
            Script::Complete {
                text: text.to_string(),
                tokens: tokens.iter().map(|t| (*t).to_string()).collect(),
                delay: Duration::ZERO,
            },
        );
    }

    /// Node completes with `text` after `delay`.
    pub fn complete_after(&self, node_id: &str, text: &str, delay: Duration) {
        self.scripts.lock().insert(
            node_id.to_string(),
            Script::Complete { text: text.to_string(), tokens: Vec::new(), delay },
        );
    }

    /// Node fails every attempt.
    pub fn fail_with(&self, node_id: &str, message: &str, retryable: bool) {
        self.scripts.lock().insert(
            node_id.to_string(),
            Script::Fail { message: message.to_string(), retryable, fail_times: None },
        );
    }

    /// Node fails the first `times` attempts, then completes with "ok".
    pub fn fail_times_then_complete(&self, node_id: &str, message: &str, times: u32) {
        self.scripts.lock().insert(
            node_id.to_string(),
            Script::Fail { message: message.to_string(), retryable: true, fail_times: Some(times) },
        );
    }

    /// `execute` returns `error` for the first `times` attempts, then
    /// completes with "ok".
    pub fn error_times_then_complete(&self, node_id: &str, error: BackendError, times: u32) {
        self.scripts.lock().insert(node_id.to_string(), Script::ExecuteError { error, times });
    }

    /// Node never produces a terminal result (cancel/crash tests).
    pub fn hang(&self, node_id: &str) {
        self.scripts.lock().insert(node_id.to_string(), Script::Hang);
    }

    /// Node violates the single-terminal contract.
    pub fn double_terminal(&self, node_id: &str) {
        self.scripts.lock().insert(node_id.to_string(), Script::DoubleTerminal);
    }

    /// Every execute request seen so far.
    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.lock().clone()
    }

    pub fn attempt_count(&self, node_id: &str) -> u32 {
        self.attempts.lock().get(node_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AgentExecutor for FakeExecutor {
    async fn execute(&self, request: ExecRequest) -> Result<EventStream, BackendError> {
        self.requests.lock().push(request.clone());
        let attempt = {
            let mut attempts = self.attempts.lock();
            let entry = attempts.entry(request.node_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        let script = self
            .scripts
            .lock()
            .get(request.node_id.as_str())
            .cloned()
            .unwrap_or(Script::Complete {
                text: "hi".to_string(),
                tokens: Vec::new(),
                delay: Duration::ZERO,
            });

        let node_id = request.node_id.clone();
        let model = request.model.clone();

        let stream: EventStream = match script {
            Script::Complete { text, tokens, delay } => {
                Box::pin(futures_util::stream::unfold(
                    (0usize, false),
                    move |(index, done)| {
                        let text = text.clone();
                        let tokens = tokens.clone();
                        let node_id = node_id.clone();
                        let model = model.clone();
                        async move {
                            if done {
                                return None;
                            }
                            if index == 0 && delay > Duration::ZERO {
                                tokio::time::sleep(delay).await;
                            }
                            if index < tokens.len() {
                                let event =
                                    ExecEvent::Progress(StreamEvent::token(&tokens[index]));
                                return Some((event, (index + 1, false)));
                            }
                            let result =
                                AgentResult::completed(node_id, model, Utc::now(), text);
                            Some((ExecEvent::Done(result), (index, true)))
                        }
                    },
                ))
            }
            Script::Fail { message, retryable, fail_times } => {
                let should_fail = fail_times.map(|n| attempt <= n).unwrap_or(true);
                let result = if should_fail {
                    AgentResult::failed(node_id, model, Utc::now(), message, retryable)
                } else {
                    AgentResult::completed(node_id, model, Utc::now(), "ok")
                };
                Box::pin(futures_util::stream::iter(vec![ExecEvent::Done(result)]))
            }
            Script::ExecuteError { error, times } => {
                if attempt <= times {
                    return Err(error);
                }
                let result = AgentResult::completed(node_id, model, Utc::now(), "ok");
                Box::pin(futures_util::stream::iter(vec![ExecEvent::Done(result)]))
            }
            Script::Hang => Box::pin(futures_util::stream::pending()),
            Script::DoubleTerminal => {
                let first = AgentResult::completed(node_id.clone(), model.clone(), Utc::now(), "a");
                let second = AgentResult::completed(node_id, model, Utc::now(), "b");
                let mut second_clone = second.clone();
                second_clone.status = TaskStatus::Completed;
                Box::pin(futures_util::stream::iter(vec![
                    ExecEvent::Done(first),
                    ExecEvent::Done(second_clone),
                ]))
            }
        };

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use sm_core::{ExecutionId, NodeId};

    fn request(node: &str) -> ExecRequest {
        ExecRequest::new(
            NodeId::new(node),
            ExecutionId::from_string("e1"),
            "prompt",
            "sonnet",
            10,
        )
    }

    #[tokio::test]
    async fn default_script_completes_with_hi() {
        let executor = FakeExecutor::new();
        let mut stream = executor.execute(request("n1")).await.unwrap();
        let event = stream.next().await.unwrap();
        let ExecEvent::Done(result) = event else { panic!("expected terminal") };
        assert_eq!(result.output_text.as_deref(), Some("hi"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn tokens_precede_terminal() {
        let executor = FakeExecutor::new();
        executor.stream_then_complete("n1", &["he", "llo"], "hello");
        let mut stream = executor.execute(request("n1")).await.unwrap();

        let mut kinds = Vec::new();
        while let Some(event) = stream.next().await {
            kinds.push(match event {
                ExecEvent::Progress(_) => "progress",
                ExecEvent::Done(_) => "done",
            });
        }
        assert_eq!(kinds, vec!["progress", "progress", "done"]);
    }

    #[tokio::test]
    async fn fail_times_then_complete_recovers() {
        let executor = FakeExecutor::new();
        executor.fail_times_then_complete("n1", "transient", 2);

        for expected in ["transient", "transient", "ok"] {
            let mut stream = executor.execute(request("n1")).await.unwrap();
            let ExecEvent::Done(result) = stream.next().await.unwrap() else {
                panic!("expected terminal")
            };
            match expected {
                "ok" => assert_eq!(result.output_text.as_deref(), Some("ok")),
                msg => assert_eq!(result.error_message.as_deref(), Some(msg)),
            }
        }
        assert_eq!(executor.attempt_count("n1"), 3);
    }

    #[tokio::test]
    async fn execute_errors_then_recovers() {
        let executor = FakeExecutor::new();
        executor.error_times_then_complete(
            "n1",
            BackendError::RateLimited { retry_after_ms: Some(100) },
            1,
        );

        let error = match executor.execute(request("n1")).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert_eq!(error, BackendError::RateLimited { retry_after_ms: Some(100) });

        let mut stream = executor.execute(request("n1")).await.unwrap();
        let ExecEvent::Done(result) = stream.next().await.unwrap() else {
            panic!("expected terminal")
        };
        assert_eq!(result.output_text.as_deref(), Some("ok"));
        assert_eq!(executor.attempt_count("n1"), 2);
    }

    #[tokio::test]
    async fn requests_are_recorded() {
        let executor = FakeExecutor::new();
        executor.execute(request("n1")).await.unwrap();
        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "prompt");
        assert_eq!(requests[0].max_turns, 10);
    }
}
