// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transition audit-log accessors
//!
//! Rows are written inside the durable store's commit transaction; this
//! module only reads them back.

use crate::db::Database;
use crate::error::StoreError;
use crate::types::TransitionRow;
use serde_json::Value;

/// Transitions for an execution, newest first, optionally per key.
pub fn list(
    db: &Database,
    execution_id: &str,
    key: Option<&str>,
    limit: u32,
) -> Result<Vec<TransitionRow>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, execution_id, key, old_value_json, new_value_json, trigger,
                    node_id, frame_id, created_at
             FROM transitions
             WHERE execution_id = ?1 AND (?2 IS NULL OR key = ?2)
             ORDER BY id DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![execution_id, key, limit], row_to_transition)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

/// All transitions written for a specific frame, oldest first.
pub fn for_frame(
    db: &Database,
    execution_id: &str,
    frame_id: u64,
) -> Result<Vec<TransitionRow>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, execution_id, key, old_value_json, new_value_json, trigger,
                    node_id, frame_id, created_at
             FROM transitions
             WHERE execution_id = ?1 AND frame_id = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![execution_id, frame_id as i64], row_to_transition)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

pub fn count(db: &Database, execution_id: &str) -> Result<u64, StoreError> {
    let n: i64 = db.with_conn(|conn| {
        conn.query_row(
            "SELECT count(*) FROM transitions WHERE execution_id = ?1",
            [execution_id],
            |r| r.get(0),
        )
    })?;
    Ok(n as u64)
}

fn row_to_transition(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransitionRow> {
    let old_text: Option<String> = row.get(3)?;
    let new_text: Option<String> = row.get(4)?;
    Ok(TransitionRow {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        key: row.get(2)?,
        old_value: old_text.and_then(|t| serde_json::from_str::<Value>(&t).ok()),
        new_value: new_text.and_then(|t| serde_json::from_str::<Value>(&t).ok()),
        trigger: row.get(5)?,
        node_id: row.get(6)?,
        frame_id: row.get::<_, Option<i64>>(7)?.map(|f| f as u64),
        created_at: row.get(8)?,
    })
}
