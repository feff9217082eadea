// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sm-rpc: External-control protocol types
//!
//! JSON-RPC 2.0 messages, the resource URI table, tool parameter and
//! result shapes, and server-sent notifications. Transport-agnostic:
//! both the stdio and HTTP transports speak these types.

mod notify;
mod protocol;
mod resources;
mod tools;

pub use notify::{sse_keepalive, Notification, StreamEnvelope};
pub use protocol::{
    error_codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId, JSONRPC_VERSION,
};
pub use resources::{
    parse_uri, Page, PageParams, ResourceRef, URI_SCHEME,
};
pub use tools::{
    ApproveParams, CancelNodeParams, DenyParams, GetFrameParams, RestartFromFrameParams,
    RetryNodeParams, SetStateParams, StartExecutionParams, StopParams, TickParams, ToolError,
    ToolSummary,
};
