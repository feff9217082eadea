// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External control of a running tick loop
//!
//! The control surface never touches the loop's state directly; it
//! sends commands that the loop applies at frame boundaries.

use crate::error::EngineError;
use crate::tick::TickOutcome;
use serde_json::Value;
use sm_core::{NodeId, StoreTier};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum EngineCommand {
    /// Run exactly one frame.
    Tick { reply: oneshot::Sender<Result<TickOutcome, String>> },
    /// Run frames until quiescence or a stop condition.
    RunUntilIdle { reply: oneshot::Sender<Result<TickOutcome, String>> },
    Pause,
    Resume,
    /// Request a graceful stop; the loop cancels tasks and exits.
    Stop { reason: Option<String> },
    /// Write a state key directly (with a transition), then re-render.
    SetState { key: String, value: Option<Value>, tier: StoreTier },
    CancelNode { node_id: NodeId },
    /// Reset a terminal task so the next frame restarts it.
    RetryNode { node_id: NodeId },
    /// Drop frames after `sequence` and re-enter from there.
    RestartFromFrame { sequence: u64, reply: oneshot::Sender<Result<(), String>> },
}

/// Cheap cloneable handle for sending commands to a loop.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(tx: mpsc::UnboundedSender<EngineCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.tx
            .send(command)
            .map_err(|_| EngineError::Internal("engine loop is gone".to_string()))
    }

    pub async fn tick(&self) -> Result<TickOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Tick { reply })?;
        rx.await
            .map_err(|_| EngineError::Internal("engine loop dropped reply".to_string()))?
            .map_err(EngineError::Internal)
    }

    pub async fn run_until_idle(&self) -> Result<TickOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RunUntilIdle { reply })?;
        rx.await
            .map_err(|_| EngineError::Internal("engine loop dropped reply".to_string()))?
            .map_err(EngineError::Internal)
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Resume)
    }

    pub fn stop(&self, reason: Option<String>) -> Result<(), EngineError> {
        self.send(EngineCommand::Stop { reason })
    }

    pub fn set_state(
        &self,
        key: impl Into<String>,
        value: Option<Value>,
        tier: StoreTier,
    ) -> Result<(), EngineError> {
        self.send(EngineCommand::SetState { key: key.into(), value, tier })
    }

    pub fn cancel_node(&self, node_id: NodeId) -> Result<(), EngineError> {
        self.send(EngineCommand::CancelNode { node_id })
    }

    pub fn retry_node(&self, node_id: NodeId) -> Result<(), EngineError> {
        self.send(EngineCommand::RetryNode { node_id })
    }

    pub async fn restart_from_frame(&self, sequence: u64) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RestartFromFrame { sequence, reply })?;
        rx.await
            .map_err(|_| EngineError::Internal("engine loop dropped reply".to_string()))?
            .map_err(EngineError::Internal)
    }
}
