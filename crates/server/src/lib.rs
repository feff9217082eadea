// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sm-server: External-control surface
//!
//! Exposes the engine over JSON-RPC 2.0 on two transports: line-
//! delimited JSON on stdio and an HTTP `/mcp` endpoint (POST for
//! request/response, GET for server-sent events). Method dispatch is
//! transport-agnostic; both transports share the dispatcher, session
//! manager, and event stream hub.

pub mod dispatch;
pub mod http;
pub mod registry;
pub mod resources;
pub mod session;
pub mod state;
pub mod stdio;
pub mod stream;
pub mod tools;

pub use dispatch::dispatch;
pub use http::{router, serve_http, HttpConfig, HttpServeError};
pub use registry::ComponentRegistry;
pub use session::SessionManager;
pub use state::ServerState;
pub use stdio::{serve_lines, serve_stdio};
pub use stream::{DropPolicy, EventStreamHub};
