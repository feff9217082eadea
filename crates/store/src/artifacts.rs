// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact table accessors
//!
//! Keyed artifacts upsert by (execution, key); keyless artifacts append.

use crate::db::{iso_from_ms, Database};
use crate::error::StoreError;
use crate::types::ArtifactRow;
use serde_json::Value;
use sm_core::{canonical_json, ArtifactRequest};

/// Write an artifact with its node/frame context.
pub fn write(
    db: &Database,
    execution_id: &str,
    request: &ArtifactRequest,
    node_id: Option<&str>,
    frame_id: Option<u64>,
    now_ms: u64,
) -> Result<(), StoreError> {
    let stamp = iso_from_ms(now_ms);
    let content = canonical_json(&request.content);

    match &request.key {
        Some(key) => {
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO artifacts
                     (execution_id, node_id, frame_id, kind, name, key, content_json,
                      created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                     ON CONFLICT(execution_id, key) WHERE key IS NOT NULL DO UPDATE SET
                         node_id = ?2, frame_id = ?3, kind = ?4, name = ?5,
                         content_json = ?7, updated_at = ?8",
                    rusqlite::params![
                        execution_id,
                        node_id,
                        frame_id.map(|f| f as i64),
                        request.kind.as_str(),
                        request.name,
                        key,
                        content,
                        stamp,
                    ],
                )
            })?;
        }
        None => {
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO artifacts
                     (execution_id, node_id, frame_id, kind, name, key, content_json,
                      created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?7)",
                    rusqlite::params![
                        execution_id,
                        node_id,
                        frame_id.map(|f| f as i64),
                        request.kind.as_str(),
                        request.name,
                        content,
                        stamp,
                    ],
                )
            })?;
        }
    }
    Ok(())
}

/// All artifacts for an execution, insertion order.
pub fn list(db: &Database, execution_id: &str) -> Result<Vec<ArtifactRow>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, execution_id, node_id, frame_id, kind, name, key, content_json,
                    created_at, updated_at
             FROM artifacts WHERE execution_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([execution_id], row_to_artifact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

fn row_to_artifact(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArtifactRow> {
    let content_text: String = row.get(7)?;
    Ok(ArtifactRow {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        node_id: row.get(2)?,
        frame_id: row.get::<_, Option<i64>>(3)?.map(|f| f as u64),
        kind: row.get(4)?,
        name: row.get(5)?,
        key: row.get(6)?,
        content: serde_json::from_str(&content_text).unwrap_or(Value::Null),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
