// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sm-store: Persistence layer for the Smithers engine
//!
//! One SQLite database per engine instance, opened in WAL mode with a
//! busy timeout and foreign keys on. The volatile store lives here too
//! so both tiers share one write-queue contract: `set` queues, `commit`
//! applies atomically, `snapshot` is isolated from later commits.

pub mod agents;
pub mod approvals;
pub mod artifacts;
pub mod db;
pub mod durable;
pub mod error;
pub mod events;
pub mod executions;
pub mod export;
pub mod frames;
pub mod schema;
pub mod tasks;
pub mod transitions;
pub mod types;
pub mod volatile;

pub use db::{iso, iso_from_ms, Database};
pub use durable::DurableStore;
pub use error::StoreError;
pub use types::{
    AgentRow, ApprovalRow, ApprovalStatus, ArtifactRow, EventRow, ExecutionRow, FrameRow, TaskRow,
    TransitionRow, WriteOp,
};
pub use volatile::VolatileStore;
