// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only resource handlers

use crate::state::ServerState;
use serde_json::{json, Value};
use sm_rpc::{JsonRpcError, Page, PageParams, ResourceRef};
use sm_store::{agents, approvals, events, executions, frames, schema, tasks};

/// The URI patterns advertised by `resources/list`.
pub fn resource_catalog() -> Value {
    json!([
        { "uri": "smithers://executions", "description": "Recent executions (paginated)" },
        { "uri": "smithers://executions/{id}", "description": "Execution detail" },
        { "uri": "smithers://executions/{id}/frames", "description": "Committed frames (paginated)" },
        { "uri": "smithers://executions/{id}/frames/{seq}", "description": "One frame with its plan" },
        { "uri": "smithers://executions/{id}/events", "description": "Event log (paginated)" },
        { "uri": "smithers://executions/{id}/nodes/{node_id}", "description": "Node detail" },
        { "uri": "smithers://executions/{id}/nodes/{node_id}/runs", "description": "Agent runs for a node" },
        { "uri": "smithers://executions/{id}/artifacts", "description": "Artifacts" },
        { "uri": "smithers://executions/{id}/approvals/pending", "description": "Pending approvals" },
        { "uri": "smithers://scripts", "description": "Registered scripts" },
        { "uri": "smithers://health", "description": "Engine health" },
    ])
}

/// Read one resource.
pub fn read_resource(
    state: &ServerState,
    resource: &ResourceRef,
    page: &PageParams,
) -> Result<Value, JsonRpcError> {
    let db = &state.db;
    let internal = |e: sm_store::StoreError| JsonRpcError::internal(e.to_string());

    match resource {
        ResourceRef::Executions => {
            let rows = executions::list_recent(db, 1_000).map_err(internal)?;
            let items = rows.into_iter().filter_map(|r| serde_json::to_value(r).ok()).collect();
            Ok(serde_json::to_value(Page::slice(items, page)).unwrap_or(Value::Null))
        }
        ResourceRef::Execution { id } => {
            let resolved = resolve(state, id)?;
            let row = executions::get(db, &resolved)
                .map_err(internal)?
                .ok_or_else(|| JsonRpcError::resource_not_found(id))?;
            Ok(serde_json::to_value(row).unwrap_or(Value::Null))
        }
        ResourceRef::Frames { execution_id } => {
            let resolved = resolve(state, execution_id)?;
            let rows = frames::list(db, &resolved, None, None).map_err(internal)?;
            let items = rows
                .into_iter()
                .map(|f| {
                    json!({
                        "sequence": f.sequence,
                        "plan_hash": f.plan_hash,
                        "phase": f.phase_marker,
                        "step": f.step_marker,
                        "created_at": f.created_at,
                    })
                })
                .collect();
            Ok(serde_json::to_value(Page::slice(items, page)).unwrap_or(Value::Null))
        }
        ResourceRef::Frame { execution_id, sequence } => {
            let resolved = resolve(state, execution_id)?;
            let frame = frames::get(db, &resolved, *sequence)
                .map_err(internal)?
                .ok_or_else(|| {
                    JsonRpcError::resource_not_found(&format!("{execution_id}/frames/{sequence}"))
                })?;
            Ok(serde_json::to_value(frame).unwrap_or(Value::Null))
        }
        ResourceRef::Events { execution_id } => {
            let resolved = resolve(state, execution_id)?;
            let after = page.offset() as i64;
            let rows = events::list_after(db, &resolved, after, page.effective_limit())
                .map_err(internal)?;
            let has_next = rows.len() as u32 == page.effective_limit();
            let next_cursor = rows.last().map(|r| r.id.to_string());
            let items: Vec<Value> =
                rows.into_iter().filter_map(|r| serde_json::to_value(r).ok()).collect();
            Ok(json!({
                "items": items,
                "next_cursor": if has_next { next_cursor } else { None },
                "has_next": has_next,
                "has_prev": after > 0,
            }))
        }
        ResourceRef::Node { execution_id, node_id } => {
            let resolved = resolve(state, execution_id)?;
            let task = tasks::get(db, &resolved, node_id).map_err(internal)?.ok_or_else(|| {
                JsonRpcError::resource_not_found(&format!("{execution_id}/nodes/{node_id}"))
            })?;
            Ok(serde_json::to_value(task).unwrap_or(Value::Null))
        }
        ResourceRef::NodeRuns { execution_id, node_id } => {
            let resolved = resolve(state, execution_id)?;
            let rows = agents::list_for_node(db, &resolved, node_id).map_err(internal)?;
            let items = rows.into_iter().filter_map(|r| serde_json::to_value(r).ok()).collect();
            Ok(serde_json::to_value(Page::slice(items, page)).unwrap_or(Value::Null))
        }
        ResourceRef::Artifacts { execution_id } => {
            let resolved = resolve(state, execution_id)?;
            let rows = sm_store::artifacts::list(db, &resolved).map_err(internal)?;
            let items = rows.into_iter().filter_map(|r| serde_json::to_value(r).ok()).collect();
            Ok(serde_json::to_value(Page::slice(items, page)).unwrap_or(Value::Null))
        }
        ResourceRef::PendingApprovals { execution_id } => {
            let resolved = resolve(state, execution_id)?;
            let rows = approvals::list_pending(db, &resolved).map_err(internal)?;
            let items = rows.into_iter().filter_map(|r| serde_json::to_value(r).ok()).collect();
            Ok(serde_json::to_value(Page::slice(items, page)).unwrap_or(Value::Null))
        }
        ResourceRef::Scripts => {
            Ok(json!({ "scripts": state.registry.names() }))
        }
        ResourceRef::Health => {
            let execution_count = executions::count(&state.db).map_err(internal)?;
            Ok(json!({
                "status": "ok",
                "schema_version": schema::SCHEMA_VERSION,
                "executions": execution_count,
                "sessions": state.sessions.len(),
                "last_event_id": state.hub.last_id(),
            }))
        }
    }
}

fn resolve(state: &ServerState, id: &str) -> Result<String, JsonRpcError> {
    executions::resolve_prefix(&state.db, id)
        .map_err(|_| JsonRpcError::resource_not_found(id))
}
