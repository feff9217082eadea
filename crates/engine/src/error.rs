// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy

use crate::effects::EffectLoopError;
use sm_backend::BackendError;
use sm_core::{FrameStormError, RenderPhaseError};
use sm_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid script, flags, or an incompatible database. Reported at
    /// startup; non-recoverable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Side effect attempted during render. Fatal to the frame.
    #[error(transparent)]
    RenderPhase(#[from] RenderPhaseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Effect repeating with identical deps. Fatal to the execution.
    #[error(transparent)]
    EffectLoop(#[from] EffectLoopError),

    /// Identical plan+state recurring or a rate ceiling hit. Fatal to
    /// the execution.
    #[error(transparent)]
    FrameStorm(#[from] FrameStormError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("execution {0} not found")]
    ExecutionNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Short kind tag recorded as an execution stop reason.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "config",
            EngineError::RenderPhase(_) => "render_purity",
            EngineError::Store(StoreError::Serialization { .. }) => "serialization",
            EngineError::Store(_) => "store",
            EngineError::EffectLoop(_) => "effect_loop",
            EngineError::FrameStorm(_) => "frame_storm",
            EngineError::Backend(_) => "backend",
            EngineError::ExecutionNotFound(_) => "not_found",
            EngineError::Internal(_) => "internal",
        }
    }
}
