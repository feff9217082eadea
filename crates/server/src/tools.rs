// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutating tool handlers

use crate::state::ServerState;
use serde_json::{json, Value};
use sm_core::StoreTier;
use sm_rpc::{
    ApproveParams, CancelNodeParams, DenyParams, GetFrameParams, JsonRpcError,
    RestartFromFrameParams, RetryNodeParams, SetStateParams, StartExecutionParams, StopParams,
    TickParams, ToolSummary,
};
use sm_store::{approvals, executions, frames};

/// Names and descriptions advertised by `tools/list`.
pub fn tool_catalog() -> Value {
    json!([
        { "name": "start_execution", "description": "Create an execution for a registered script and start its engine" },
        { "name": "tick", "description": "Run exactly one frame" },
        { "name": "run_until_idle", "description": "Run frames until quiescence or a stop condition" },
        { "name": "stop", "description": "Request a graceful stop" },
        { "name": "pause", "description": "Pause the tick loop" },
        { "name": "resume", "description": "Resume a paused tick loop" },
        { "name": "set_state", "description": "Write one state key and trigger a re-render" },
        { "name": "restart_from_frame", "description": "Drop frames after a sequence and re-enter" },
        { "name": "get_frame", "description": "Fetch one committed frame" },
        { "name": "cancel_node", "description": "Request cancellation of a node's task" },
        { "name": "retry_node", "description": "Restart a terminal node task" },
        { "name": "approve", "description": "Approve a pending approval request" },
        { "name": "deny", "description": "Deny a pending approval request" },
    ])
}

fn params<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(arguments).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

/// Dispatch one `tools/call`.
pub async fn call_tool(
    state: &ServerState,
    name: &str,
    arguments: Value,
) -> Result<Value, JsonRpcError> {
    let summary = match name {
        "start_execution" => {
            let p: StartExecutionParams = params(arguments)?;
            p.validate().map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
            let execution_id = state.start_execution(
                &p.script,
                p.name.as_deref(),
                p.execution_id.as_deref(),
                &p.config,
            )?;
            ToolSummary::ok(name).with_execution(execution_id)
        }
        "tick" => {
            let p: TickParams = params(arguments)?;
            let outcome = state
                .handle(&p.execution_id)?
                .tick()
                .await
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            ToolSummary::ok(name).with_execution(p.execution_id).with_detail(json!({
                "frames_run": outcome.frames_run,
                "quiescent": outcome.quiescent,
                "latest_sequence": outcome.latest_sequence,
            }))
        }
        "run_until_idle" => {
            let p: TickParams = params(arguments)?;
            let outcome = state
                .handle(&p.execution_id)?
                .run_until_idle()
                .await
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            ToolSummary::ok(name).with_execution(p.execution_id).with_detail(json!({
                "frames_run": outcome.frames_run,
                "quiescent": outcome.quiescent,
                "stop_reason": outcome.stop_reason,
            }))
        }
        "stop" => {
            let p: StopParams = params(arguments)?;
            state
                .handle(&p.execution_id)?
                .stop(p.reason)
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            state.drop_handle(&p.execution_id);
            ToolSummary::ok(name).with_execution(p.execution_id)
        }
        "pause" => {
            let p: TickParams = params(arguments)?;
            state
                .handle(&p.execution_id)?
                .pause()
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            ToolSummary::ok(name).with_execution(p.execution_id)
        }
        "resume" => {
            let p: TickParams = params(arguments)?;
            state
                .handle(&p.execution_id)?
                .resume()
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            ToolSummary::ok(name).with_execution(p.execution_id)
        }
        "set_state" => {
            let p: SetStateParams = params(arguments)?;
            p.validate().map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
            let tier = match p.tier.as_deref() {
                Some("volatile") => StoreTier::Volatile,
                _ => StoreTier::Durable,
            };
            let value = if p.value.is_null() { None } else { Some(p.value.clone()) };
            state
                .handle(&p.execution_id)?
                .set_state(&p.key, value, tier)
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            ToolSummary::ok(name)
                .with_execution(p.execution_id)
                .with_detail(json!({ "key": p.key }))
        }
        "restart_from_frame" => {
            let p: RestartFromFrameParams = params(arguments)?;
            state
                .handle(&p.execution_id)?
                .restart_from_frame(p.sequence)
                .await
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            ToolSummary::ok(name)
                .with_execution(p.execution_id)
                .with_detail(json!({ "sequence": p.sequence }))
        }
        "get_frame" => {
            let p: GetFrameParams = params(arguments)?;
            let resolved = executions::resolve_prefix(&state.db, &p.execution_id)
                .map_err(|_| JsonRpcError::resource_not_found(&p.execution_id))?;
            let frame = frames::get(&state.db, &resolved, p.sequence)
                .map_err(|e| JsonRpcError::internal(e.to_string()))?
                .ok_or_else(|| {
                    JsonRpcError::resource_not_found(&format!(
                        "{}/frames/{}",
                        p.execution_id, p.sequence
                    ))
                })?;
            ToolSummary::ok(name)
                .with_execution(resolved)
                .with_detail(serde_json::to_value(frame).unwrap_or(Value::Null))
        }
        "cancel_node" => {
            let p: CancelNodeParams = params(arguments)?;
            state
                .handle(&p.execution_id)?
                .cancel_node(sm_core::NodeId::new(&p.node_id))
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            ToolSummary::ok(name)
                .with_execution(p.execution_id)
                .with_detail(json!({ "node_id": p.node_id }))
        }
        "retry_node" => {
            let p: RetryNodeParams = params(arguments)?;
            state
                .handle(&p.execution_id)?
                .retry_node(sm_core::NodeId::new(&p.node_id))
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            ToolSummary::ok(name)
                .with_execution(p.execution_id)
                .with_detail(json!({ "node_id": p.node_id }))
        }
        "approve" => {
            let p: ApproveParams = params(arguments)?;
            respond_approval(state, &p.approval_id, true, p.responder, p.comment, p.data)?;
            ToolSummary::ok(name).with_detail(json!({ "approval_id": p.approval_id }))
        }
        "deny" => {
            let p: DenyParams = params(arguments)?;
            respond_approval(state, &p.approval_id, false, p.responder, p.comment, None)?;
            ToolSummary::ok(name).with_detail(json!({ "approval_id": p.approval_id }))
        }
        other => return Err(JsonRpcError::method_not_found(&format!("tools/{other}"))),
    };

    serde_json::to_value(summary).map_err(|e| JsonRpcError::internal(e.to_string()))
}

fn respond_approval(
    state: &ServerState,
    approval_id: &str,
    approved: bool,
    responder: Option<String>,
    comment: Option<String>,
    data: Option<Value>,
) -> Result<(), JsonRpcError> {
    approvals::respond(
        &state.db,
        approval_id,
        approved,
        responder.as_deref().unwrap_or("external"),
        comment.as_deref(),
        data.as_ref(),
        state.now_ms(),
    )
    .map(|_| ())
    .map_err(|e| match e {
        sm_store::StoreError::NotFound { .. } => JsonRpcError::resource_not_found(approval_id),
        other => JsonRpcError::internal(other.to_string()),
    })
}
