// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval table accessors
//!
//! Row state machine: pending → approved | denied | expired. Only
//! pending rows may be resolved; anything else is rejected.

use crate::db::{iso_from_ms, Database};
use crate::error::StoreError;
use crate::types::{ApprovalRow, ApprovalStatus};
use serde_json::Value;
use sm_core::canonical_json;

/// Create a pending approval request.
#[allow(clippy::too_many_arguments)]
pub fn create(
    db: &Database,
    id: &str,
    execution_id: &str,
    node_id: &str,
    kind: &str,
    payload: &Value,
    prompt: &str,
    options: &[String],
    now_ms: u64,
) -> Result<(), StoreError> {
    let options_json = serde_json::to_string(options).unwrap_or_else(|_| "[]".to_string());
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO approvals
             (id, execution_id, node_id, kind, payload_json, prompt, options_json,
              status, requested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
            rusqlite::params![
                id,
                execution_id,
                node_id,
                kind,
                canonical_json(payload),
                prompt,
                options_json,
                iso_from_ms(now_ms),
            ],
        )
    })?;
    Ok(())
}

pub fn get(db: &Database, id: &str) -> Result<Option<ApprovalRow>, StoreError> {
    let row = db.with_conn(|conn| {
        conn.query_row(
            "SELECT id, execution_id, node_id, kind, payload_json, prompt, options_json,
                    status, responder, response_json, comment, requested_at, responded_at
             FROM approvals WHERE id = ?1",
            [id],
            row_to_approval,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })
    })?;
    Ok(row)
}

/// Pending approvals for an execution, oldest first.
pub fn list_pending(db: &Database, execution_id: &str) -> Result<Vec<ApprovalRow>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, execution_id, node_id, kind, payload_json, prompt, options_json,
                    status, responder, response_json, comment, requested_at, responded_at
             FROM approvals WHERE execution_id = ?1 AND status = 'pending'
             ORDER BY requested_at ASC",
        )?;
        let rows = stmt
            .query_map([execution_id], row_to_approval)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

/// Resolve a pending request. Fails when the row is missing or already
/// resolved.
pub fn respond(
    db: &Database,
    id: &str,
    approved: bool,
    responder: &str,
    comment: Option<&str>,
    data: Option<&Value>,
    now_ms: u64,
) -> Result<ApprovalRow, StoreError> {
    let status = if approved { ApprovalStatus::Approved } else { ApprovalStatus::Denied };
    let updated = db.with_conn(|conn| {
        conn.execute(
            "UPDATE approvals
             SET status = ?2, responder = ?3, response_json = ?4, comment = ?5, responded_at = ?6
             WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![
                id,
                status.as_str(),
                responder,
                data.map(canonical_json),
                comment,
                iso_from_ms(now_ms),
            ],
        )
    })?;

    if updated == 0 {
        return Err(StoreError::NotFound { kind: "pending approval", id: id.to_string() });
    }

    get(db, id)?.ok_or(StoreError::NotFound { kind: "approval", id: id.to_string() })
}

/// Expire a pending request. Treated as denial with a synthetic comment.
pub fn expire(db: &Database, id: &str, now_ms: u64) -> Result<bool, StoreError> {
    let updated = db.with_conn(|conn| {
        conn.execute(
            "UPDATE approvals
             SET status = 'expired', comment = 'approval timed out', responded_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![id, iso_from_ms(now_ms)],
        )
    })?;
    Ok(updated > 0)
}

fn row_to_approval(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApprovalRow> {
    let payload_text: String = row.get(4)?;
    let options_text: String = row.get(6)?;
    let status_text: String = row.get(7)?;
    let response_text: Option<String> = row.get(9)?;
    Ok(ApprovalRow {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        node_id: row.get(2)?,
        kind: row.get(3)?,
        payload: serde_json::from_str(&payload_text).unwrap_or(Value::Null),
        prompt: row.get(5)?,
        options: serde_json::from_str(&options_text).unwrap_or_default(),
        status: status_text.parse().unwrap_or(ApprovalStatus::Pending),
        responder: row.get(8)?,
        response: response_text.and_then(|t| serde_json::from_str(&t).ok()),
        comment: row.get(10)?,
        requested_at: row.get(11)?,
        responded_at: row.get(12)?,
    })
}

#[cfg(test)]
#[path = "approvals_tests.rs"]
mod tests;
