// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-run and tool-call table accessors

use crate::db::{iso, Database};
use crate::error::StoreError;
use crate::types::AgentRow;
use serde_json::Value;
use sm_core::{canonical_json, AgentResult, TaskStatus, ToolCallRecord};

/// Persist a terminal agent result and its tool calls.
pub fn record_result(
    db: &Database,
    execution_id: &str,
    result: &AgentResult,
) -> Result<(), StoreError> {
    let output_json = result.output_structured.as_ref().map(canonical_json);

    db.with_tx(|tx| {
        tx.execute(
            "INSERT INTO agents
             (id, execution_id, node_id, model, status, started_at, ended_at, turns_used,
              prompt_tokens, completion_tokens, total_tokens, output_text, output_json,
              error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            rusqlite::params![
                result.run_id.as_str(),
                execution_id,
                result.node_id.as_str(),
                result.model,
                result.status.as_str(),
                iso(result.started_at),
                result.ended_at.map(iso),
                result.turns_used,
                result.usage.prompt_tokens as i64,
                result.usage.completion_tokens as i64,
                result.usage.total_tokens as i64,
                result.output_text,
                output_json,
                result.error_message,
            ],
        )?;

        for call in &result.tool_calls {
            record_tool_call(tx, result.run_id.as_str(), call)?;
        }
        Ok(())
    })
}

fn record_tool_call(
    tx: &rusqlite::Transaction<'_>,
    agent_id: &str,
    call: &ToolCallRecord,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO tool_calls
         (agent_id, tool_name, input_json, output_json, error, started_at, ended_at, duration_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            agent_id,
            call.tool_name,
            canonical_json(&call.input),
            call.output.as_ref().map(canonical_json),
            call.error,
            call.started_at.map(iso),
            call.ended_at.map(iso),
            call.duration_ms.map(|d| d as i64),
        ],
    )?;
    Ok(())
}

/// Agent runs for one node, newest first.
pub fn list_for_node(
    db: &Database,
    execution_id: &str,
    node_id: &str,
) -> Result<Vec<AgentRow>, StoreError> {
    query_agents(
        db,
        "SELECT id, execution_id, node_id, model, status, started_at, ended_at, turns_used,
                prompt_tokens, completion_tokens, total_tokens, output_text, output_json,
                error_message
         FROM agents WHERE execution_id = ?1 AND node_id = ?2
         ORDER BY started_at DESC",
        rusqlite::params![execution_id, node_id],
    )
}

/// Recent agent runs for an execution, newest first.
pub fn recent_for_execution(
    db: &Database,
    execution_id: &str,
    limit: u32,
) -> Result<Vec<AgentRow>, StoreError> {
    query_agents(
        db,
        "SELECT id, execution_id, node_id, model, status, started_at, ended_at, turns_used,
                prompt_tokens, completion_tokens, total_tokens, output_text, output_json,
                error_message
         FROM agents WHERE execution_id = ?1
         ORDER BY started_at DESC LIMIT ?2",
        rusqlite::params![execution_id, limit],
    )
}

fn query_agents(
    db: &Database,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<AgentRow>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_agent)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

/// Tool calls for one agent run, in call order.
pub fn tool_calls_for_agent(
    db: &Database,
    agent_id: &str,
) -> Result<Vec<ToolCallRecord>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tool_name, input_json, output_json, error, duration_ms
             FROM tool_calls WHERE agent_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([agent_id], |row| {
                let input_text: String = row.get(1)?;
                let output_text: Option<String> = row.get(2)?;
                Ok(ToolCallRecord {
                    tool_name: row.get(0)?,
                    input: serde_json::from_str(&input_text).unwrap_or(Value::Null),
                    output: output_text.and_then(|t| serde_json::from_str(&t).ok()),
                    error: row.get(3)?,
                    started_at: None,
                    ended_at: None,
                    duration_ms: row.get::<_, Option<i64>>(4)?.map(|d| d as u64),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRow> {
    let status_text: String = row.get(4)?;
    let output_text: Option<String> = row.get(12)?;
    Ok(AgentRow {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        node_id: row.get(2)?,
        model: row.get(3)?,
        status: status_text.parse().unwrap_or(TaskStatus::Failed),
        started_at: row.get(5)?,
        ended_at: row.get(6)?,
        turns_used: row.get::<_, i64>(7)? as u32,
        prompt_tokens: row.get::<_, i64>(8)? as u64,
        completion_tokens: row.get::<_, i64>(9)? as u64,
        total_tokens: row.get::<_, i64>(10)? as u64,
        output_text: row.get(11)?,
        output_structured: output_text.and_then(|t| serde_json::from_str(&t).ok()),
        error_message: row.get(13)?,
    })
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
