// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport-agnostic method dispatch

use crate::resources::{read_resource, resource_catalog};
use crate::state::ServerState;
use crate::tools::{call_tool, tool_catalog};
use serde_json::{json, Value};
use sm_rpc::{parse_uri, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PageParams};

/// Dispatch one request. Notifications (no id) get no response.
pub async fn dispatch(state: &ServerState, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    let id = request.id.clone();
    let is_notification = request.is_notification();

    let result = handle(state, &request).await;

    if is_notification {
        if let Err(error) = result {
            tracing::warn!(method = request.method, "notification failed: {}", error.message);
        }
        return None;
    }

    Some(match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

async fn handle(state: &ServerState, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
    if request.jsonrpc != sm_rpc::JSONRPC_VERSION {
        return Err(JsonRpcError::new(
            sm_rpc::error_codes::INVALID_REQUEST,
            format!("unsupported jsonrpc version {:?}", request.jsonrpc),
        ));
    }

    // Any request may carry a session id; a stale one is an error.
    if let Some(session_id) = request.params.get("session_id").and_then(Value::as_str) {
        if request.method != "initialize" && !state.sessions.touch(session_id, state.now_ms()) {
            return Err(JsonRpcError::session_expired());
        }
    }

    match request.method.as_str() {
        "initialize" => {
            let session_id = state.sessions.create(state.now_ms());
            Ok(json!({
                "session_id": session_id,
                "capabilities": {
                    "resources": true,
                    "tools": true,
                    "notifications": [
                        "frame.created",
                        "node.updated",
                        "task.updated",
                        "agent.stream",
                        "approval.requested",
                        "execution.status",
                    ],
                },
            }))
        }
        "resources/list" => Ok(json!({ "resources": resource_catalog() })),
        "resources/read" => {
            let uri = request
                .params
                .get("uri")
                .and_then(Value::as_str)
                .ok_or_else(|| JsonRpcError::invalid_params("missing uri"))?;
            let resource =
                parse_uri(uri).ok_or_else(|| JsonRpcError::resource_not_found(uri))?;
            let page = PageParams {
                cursor: request
                    .params
                    .get("cursor")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                limit: request
                    .params
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map(|l| l as u32),
            };
            read_resource(state, &resource, &page)
        }
        "tools/list" => Ok(json!({ "tools": tool_catalog() })),
        "tools/call" => {
            let name = request
                .params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| JsonRpcError::invalid_params("missing tool name"))?;
            let arguments =
                request.params.get("arguments").cloned().unwrap_or(Value::Null);
            call_tool(state, name, arguments).await
        }
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
