// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sm-core: Core library for the Smithers orchestration engine
//!
//! Holds the plan-tree node model, deterministic node identity, the
//! action queue with conflict resolution, frame phases and render
//! purity, the plan serializer, stop conditions, and the frame-storm
//! guard. No I/O lives here; stores and executors build on these types.

pub mod action;
pub mod agent;
pub mod clock;
pub mod event;
pub mod handler;
pub mod id;
pub mod identity;
pub mod node;
pub mod phase;
pub mod serialize;
pub mod stop;
pub mod storm;

pub use action::{
    group_by_key, resolve_conflicts, Action, ActionKind, ActionQueue, Reducer, Resolved,
    TransitionRecord,
};
pub use agent::{
    AgentResult, ExecutionStatus, StreamEvent, TaskStatus, TokenUsage, ToolCallRecord,
};
#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
pub use clock::{Clock, SystemClock};
pub use event::EngineEvent;
pub use handler::{
    ApprovalSpec, ArtifactKind, ArtifactRequest, HandlerCtx, HandlerError, QueuedWrite, StoreTier,
};
pub use id::{short, ApprovalId, ExecutionId, NodeId, RunId};
pub use identity::{
    assign_node_ids, compute_execution_signature, compute_node_id, reconcile, validate_resume,
    LintWarning, MountedNode, NodeIdentityTracker, PlanLinter, ReconcileResult, ResumeContext,
};
pub use node::{
    canonical_json, ApprovalGate, ClaudeNode, CompletionHandler, EachNode, EffectCleanup,
    EffectNode, EffectSetup, FragmentNode, HandlerBundle, IfNode, Node, NodeError, PhaseNode,
    ProgressHandler, RalphNode, SmithersNode, StepNode, StopNode, TextNode, WhileNode,
    DEFAULT_MAX_TURNS, DEFAULT_MODEL,
};
pub use phase::{
    check_db_write_allowed, check_task_allowed, check_write_allowed, current_phase, FramePhase,
    PhaseGuard, RenderPhaseError,
};
pub use serialize::{
    parse_plan, serialize_plan, serialize_plan_annotated, PlanElement, PlanParseError,
};
pub use stop::{check_stop_conditions, ExecutionStats, StopCheck, StopConditions, StopResult};
pub use storm::{FrameStormError, FrameStormGuard};
