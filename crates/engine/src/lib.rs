// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sm-engine: The tick loop and its supporting machinery
//!
//! One frame moves through seven phases: snapshot, render (pure),
//! reconcile, commit, execute, post-commit effects, flush. Everything
//! here exists to make that cycle deterministic, resumable, and safe
//! to kill at any point.

pub mod context;
pub mod control;
pub mod effects;
pub mod error;
pub mod events;
pub mod lease;
pub mod tick;
pub mod transaction;

pub use context::{Component, Context, DbView, GuardedState, GuardedVolatile};
pub use control::{EngineCommand, EngineHandle};
pub use effects::{EffectLoopDetector, EffectLoopError, EffectRegistry};
pub use error::EngineError;
pub use events::EventSystem;
pub use lease::{
    recover_orphans, CancellationHandler, LeaseConfig, LeaseManager, OrphanAction, OrphanPolicy,
};
pub use tick::{EngineConfig, TickLoop, TickOutcome};
pub use transaction::{run_handler_transaction, HandlerOutcome};
