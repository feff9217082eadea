// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event audit-table accessors

use crate::db::{iso_from_ms, Database};
use crate::error::StoreError;
use crate::types::EventRow;
use serde_json::Value;
use sm_core::canonical_json;

/// Append an event row. Returns the monotone event id.
pub fn record(
    db: &Database,
    execution_id: &str,
    source: &str,
    node_id: Option<&str>,
    event_type: &str,
    payload: &Value,
    now_ms: u64,
) -> Result<i64, StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO events (execution_id, source, node_id, event_type, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                execution_id,
                source,
                node_id,
                event_type,
                canonical_json(payload),
                iso_from_ms(now_ms),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
    .map_err(StoreError::from)
}

/// Events for an execution with id > `after`, oldest first.
pub fn list_after(
    db: &Database,
    execution_id: &str,
    after: i64,
    limit: u32,
) -> Result<Vec<EventRow>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, execution_id, source, node_id, event_type, payload_json, created_at
             FROM events WHERE execution_id = ?1 AND id > ?2
             ORDER BY id ASC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![execution_id, after, limit], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

pub fn count(db: &Database, execution_id: &str) -> Result<u64, StoreError> {
    let n: i64 = db.with_conn(|conn| {
        conn.query_row(
            "SELECT count(*) FROM events WHERE execution_id = ?1",
            [execution_id],
            |r| r.get(0),
        )
    })?;
    Ok(n as u64)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    let payload_text: String = row.get(5)?;
    Ok(EventRow {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        source: row.get(2)?,
        node_id: row.get(3)?,
        event_type: row.get(4)?,
        payload: serde_json::from_str(&payload_text).unwrap_or(Value::Null),
        created_at: row.get(6)?,
    })
}
