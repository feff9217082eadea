// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame table accessors
//!
//! Sequence numbers are dense and strictly increasing per execution;
//! the UNIQUE constraint backs that invariant.

use crate::db::{iso_from_ms, Database};
use crate::error::StoreError;
use crate::types::FrameRow;

/// Insert a committed frame. Returns the row id.
#[allow(clippy::too_many_arguments)]
pub fn insert(
    db: &Database,
    execution_id: &str,
    sequence: u64,
    plan_text: &str,
    plan_hash: &str,
    phase_marker: Option<&str>,
    step_marker: Option<&str>,
    mounted_ids: &[String],
    now_ms: u64,
) -> Result<i64, StoreError> {
    let mounted_json = serde_json::to_string(mounted_ids).unwrap_or_else(|_| "[]".to_string());
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO frames
             (execution_id, sequence, plan_text, plan_hash, phase_marker, step_marker,
              mounted_ids_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                execution_id,
                sequence as i64,
                plan_text,
                plan_hash,
                phase_marker,
                step_marker,
                mounted_json,
                iso_from_ms(now_ms),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
    .map_err(StoreError::from)
}

/// Highest committed sequence for an execution.
pub fn latest_sequence(db: &Database, execution_id: &str) -> Result<Option<u64>, StoreError> {
    let seq: Option<i64> = db.with_conn(|conn| {
        conn.query_row(
            "SELECT MAX(sequence) FROM frames WHERE execution_id = ?1",
            [execution_id],
            |row| row.get(0),
        )
    })?;
    Ok(seq.map(|s| s as u64))
}

/// Fetch one frame by sequence.
pub fn get(
    db: &Database,
    execution_id: &str,
    sequence: u64,
) -> Result<Option<FrameRow>, StoreError> {
    let row = db.with_conn(|conn| {
        conn.query_row(
            "SELECT id, execution_id, sequence, plan_text, plan_hash, phase_marker,
                    step_marker, mounted_ids_json, created_at
             FROM frames WHERE execution_id = ?1 AND sequence = ?2",
            rusqlite::params![execution_id, sequence as i64],
            row_to_frame,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })
    })?;
    Ok(row)
}

/// Frames in `[from, to]` sequence order (inclusive bounds, optional).
pub fn list(
    db: &Database,
    execution_id: &str,
    from: Option<u64>,
    to: Option<u64>,
) -> Result<Vec<FrameRow>, StoreError> {
    let from = from.map(|v| v as i64).unwrap_or(0);
    let to = to.map(|v| v as i64).unwrap_or(i64::MAX);
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, execution_id, sequence, plan_text, plan_hash, phase_marker,
                    step_marker, mounted_ids_json, created_at
             FROM frames
             WHERE execution_id = ?1 AND sequence >= ?2 AND sequence <= ?3
             ORDER BY sequence ASC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![execution_id, from, to], row_to_frame)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

pub fn count(db: &Database, execution_id: &str) -> Result<u64, StoreError> {
    let n: i64 = db.with_conn(|conn| {
        conn.query_row(
            "SELECT count(*) FROM frames WHERE execution_id = ?1",
            [execution_id],
            |r| r.get(0),
        )
    })?;
    Ok(n as u64)
}

/// Delete frames after `sequence` (restart_from_frame support).
pub fn truncate_after(
    db: &Database,
    execution_id: &str,
    sequence: u64,
) -> Result<u64, StoreError> {
    let deleted = db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM frames WHERE execution_id = ?1 AND sequence > ?2",
            rusqlite::params![execution_id, sequence as i64],
        )
    })?;
    Ok(deleted as u64)
}

fn row_to_frame(row: &rusqlite::Row<'_>) -> rusqlite::Result<FrameRow> {
    let mounted_text: String = row.get(7)?;
    Ok(FrameRow {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        sequence: row.get::<_, i64>(2)? as u64,
        plan_text: row.get(3)?,
        plan_hash: row.get(4)?,
        phase_marker: row.get(5)?,
        step_marker: row.get(6)?,
        mounted_ids: serde_json::from_str(&mounted_text).unwrap_or_default(),
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
#[path = "frames_tests.rs"]
mod tests;
