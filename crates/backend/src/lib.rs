// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sm-backend: Engine collaborators behind trait seams
//!
//! The agent executor, retry/rate-limit plumbing, approval broker,
//! artifact store, guarded file-system surface, and VCS helpers. The
//! engine only sees the contracts; swapping a real model backend for
//! the scripted fake is a one-line change in tests.

pub mod approvals;
pub mod artifacts;
pub mod echo;
pub mod error;
pub mod executor;
pub mod fs;
pub mod ratelimit;
pub mod retry;
pub mod vcs;
pub mod watcher;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use approvals::{ApprovalBroker, ApprovalOutcome};
pub use artifacts::ArtifactStore;
pub use echo::EchoExecutor;
pub use error::BackendError;
pub use executor::{AgentExecutor, EventStream, ExecEvent, ExecRequest};
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeExecutor;
pub use fs::FsSurface;
pub use ratelimit::RateLimitCoordinator;
pub use retry::{ErrorClass, ErrorClassifier, RetryPolicy};
pub use vcs::{VcsBackend, VcsKind};
pub use watcher::{FsWatcher, WatcherConfig};
