// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame phases and render-purity enforcement
//!
//! The tick loop is single-threaded, so the current phase lives in a
//! thread-local cell. Store wrappers consult it: during render any
//! state write, durable write, or task start is an error.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use thiserror::Error;

/// Where the tick loop is within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePhase {
    Snapshot,
    Render,
    Reconcile,
    Commit,
    Execute,
    Effects,
    Flush,
    Idle,
}

impl FramePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FramePhase::Snapshot => "snapshot",
            FramePhase::Render => "render",
            FramePhase::Reconcile => "reconcile",
            FramePhase::Commit => "commit",
            FramePhase::Execute => "execute",
            FramePhase::Effects => "effects",
            FramePhase::Flush => "flush",
            FramePhase::Idle => "idle",
        }
    }
}

thread_local! {
    static CURRENT_PHASE: Cell<FramePhase> = const { Cell::new(FramePhase::Idle) };
}

/// The phase the current thread is in.
pub fn current_phase() -> FramePhase {
    CURRENT_PHASE.with(Cell::get)
}

/// RAII scope that sets the phase and restores the previous one on drop.
#[must_use = "dropping the guard immediately restores the previous phase"]
pub struct PhaseGuard {
    previous: FramePhase,
}

impl PhaseGuard {
    pub fn enter(phase: FramePhase) -> Self {
        let previous = CURRENT_PHASE.with(|cell| cell.replace(phase));
        Self { previous }
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        CURRENT_PHASE.with(|cell| cell.set(self.previous));
    }
}

/// Side effect attempted during the pure render phase.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderPhaseError {
    #[error("cannot write state key {key:?} during render; use an effect or handler")]
    Write { key: String },

    #[error("cannot start task {task:?} during render; tasks start in the execute phase")]
    Task { task: String },

    #[error("cannot perform database write {operation:?} during render")]
    DbWrite { operation: String },
}

/// Check that a state write is allowed in the current phase.
pub fn check_write_allowed(key: &str) -> Result<(), RenderPhaseError> {
    if current_phase() == FramePhase::Render {
        return Err(RenderPhaseError::Write { key: key.to_string() });
    }
    Ok(())
}

/// Check that starting a task is allowed in the current phase.
pub fn check_task_allowed(task: &str) -> Result<(), RenderPhaseError> {
    if current_phase() == FramePhase::Render {
        return Err(RenderPhaseError::Task { task: task.to_string() });
    }
    Ok(())
}

/// Check that a durable write is allowed in the current phase.
pub fn check_db_write_allowed(operation: &str) -> Result<(), RenderPhaseError> {
    if current_phase() == FramePhase::Render {
        return Err(RenderPhaseError::DbWrite { operation: operation.to_string() });
    }
    Ok(())
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
