// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution table accessors

use crate::db::{iso_from_ms, Database};
use crate::error::StoreError;
use crate::types::ExecutionRow;
use serde_json::Value;
use sm_core::{canonical_json, ExecutionStatus};

/// Create a new execution row in `pending` status.
pub fn create(
    db: &Database,
    id: &str,
    name: &str,
    source_ref: Option<&str>,
    config: &Value,
    now_ms: u64,
) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO executions (id, name, source_ref, config_json, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            rusqlite::params![id, name, source_ref, canonical_json(config), iso_from_ms(now_ms)],
        )
    })?;
    Ok(())
}

/// Fetch an execution by exact id.
pub fn get(db: &Database, id: &str) -> Result<Option<ExecutionRow>, StoreError> {
    let row = db.with_conn(|conn| {
        conn.query_row(
            "SELECT id, name, source_ref, config_json, status, stop_reason, iterations,
                    total_tokens, total_tool_calls, created_at, started_at, completed_at
             FROM executions WHERE id = ?1",
            [id],
            row_to_execution,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })
    })?;
    Ok(row)
}

/// Resolve an id or unique prefix to a full execution id.
pub fn resolve_prefix(db: &Database, prefix: &str) -> Result<String, StoreError> {
    let matches: Vec<String> = db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT id FROM executions WHERE id LIKE ?1 || '%' LIMIT 3")?;
        let rows = stmt
            .query_map([prefix], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;

    match matches.len() {
        0 => Err(StoreError::NotFound { kind: "execution", id: prefix.to_string() }),
        1 => Ok(matches.into_iter().next().unwrap_or_default()),
        n => Err(StoreError::AmbiguousPrefix { prefix: prefix.to_string(), count: n }),
    }
}

/// Most recent executions, newest first.
pub fn list_recent(db: &Database, limit: u32) -> Result<Vec<ExecutionRow>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, source_ref, config_json, status, stop_reason, iterations,
                    total_tokens, total_tool_calls, created_at, started_at, completed_at
             FROM executions ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], row_to_execution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

pub fn count(db: &Database) -> Result<u64, StoreError> {
    let n: i64 =
        db.with_conn(|conn| conn.query_row("SELECT count(*) FROM executions", [], |r| r.get(0)))?;
    Ok(n as u64)
}

/// Transition to `running` and stamp `started_at` (idempotent on resume).
pub fn mark_started(db: &Database, id: &str, now_ms: u64) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE executions SET status = 'running',
                    started_at = COALESCE(started_at, ?2)
             WHERE id = ?1",
            rusqlite::params![id, iso_from_ms(now_ms)],
        )
    })?;
    Ok(())
}

/// Terminal transition with optional stop reason.
pub fn mark_finished(
    db: &Database,
    id: &str,
    status: ExecutionStatus,
    stop_reason: Option<&str>,
    now_ms: u64,
) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE executions SET status = ?2, stop_reason = ?3, completed_at = ?4
             WHERE id = ?1",
            rusqlite::params![id, status.as_str(), stop_reason, iso_from_ms(now_ms)],
        )
    })?;
    Ok(())
}

/// Overwrite the running counters with the latest totals.
pub fn update_counters(
    db: &Database,
    id: &str,
    iterations: u64,
    total_tokens: u64,
    total_tool_calls: u64,
) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE executions
             SET iterations = ?2, total_tokens = ?3, total_tool_calls = ?4
             WHERE id = ?1",
            rusqlite::params![id, iterations as i64, total_tokens as i64, total_tool_calls as i64],
        )
    })?;
    Ok(())
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRow> {
    let config_text: Option<String> = row.get(3)?;
    let status_text: String = row.get(4)?;
    Ok(ExecutionRow {
        id: row.get(0)?,
        name: row.get(1)?,
        source_ref: row.get(2)?,
        config: config_text
            .and_then(|t| serde_json::from_str(&t).ok())
            .unwrap_or(Value::Null),
        status: status_text.parse().unwrap_or(ExecutionStatus::Pending),
        stop_reason: row.get(5)?,
        iterations: row.get::<_, i64>(6)? as u64,
        total_tokens: row.get::<_, i64>(7)? as u64,
        total_tool_calls: row.get::<_, i64>(8)? as u64,
        created_at: row.get(9)?,
        started_at: row.get(10)?,
        completed_at: row.get(11)?,
    })
}

#[cfg(test)]
#[path = "executions_tests.rs"]
mod tests;
