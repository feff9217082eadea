// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task table accessors, including the lease protocol rows
//!
//! A task's lease columns (`lease_owner`, `lease_expires_at`,
//! `heartbeat_at`) implement crash safety: at most one live owner per
//! task, orphans detected by expired leases on startup.

use crate::db::{iso_from_ms, Database};
use crate::error::StoreError;
use crate::types::TaskRow;
use sm_core::TaskStatus;

/// Register a task (or reset an existing row for a retry attempt).
pub fn register(
    db: &Database,
    execution_id: &str,
    task_id: &str,
    name: &str,
    now_ms: u64,
) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tasks (id, execution_id, name, status, started_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)
             ON CONFLICT(id, execution_id)
             DO UPDATE SET name = ?3, status = 'pending', started_at = ?4, completed_at = NULL",
            rusqlite::params![task_id, execution_id, name, iso_from_ms(now_ms)],
        )
    })?;
    Ok(())
}

pub fn get(
    db: &Database,
    execution_id: &str,
    task_id: &str,
) -> Result<Option<TaskRow>, StoreError> {
    let row = db.with_conn(|conn| {
        conn.query_row(
            "SELECT id, execution_id, name, status, lease_owner, lease_expires_at,
                    heartbeat_at, retry_count, started_at, completed_at
             FROM tasks WHERE execution_id = ?1 AND id = ?2",
            [execution_id, task_id],
            row_to_task,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })
    })?;
    Ok(row)
}

pub fn list_for_execution(db: &Database, execution_id: &str) -> Result<Vec<TaskRow>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, execution_id, name, status, lease_owner, lease_expires_at,
                    heartbeat_at, retry_count, started_at, completed_at
             FROM tasks WHERE execution_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([execution_id], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

pub fn set_status(
    db: &Database,
    execution_id: &str,
    task_id: &str,
    status: TaskStatus,
    now_ms: u64,
) -> Result<(), StoreError> {
    let completed_at = status.is_terminal().then(|| iso_from_ms(now_ms));
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE tasks SET status = ?3, completed_at = COALESCE(?4, completed_at)
             WHERE execution_id = ?1 AND id = ?2",
            rusqlite::params![execution_id, task_id, status.as_str(), completed_at],
        )
    })?;
    Ok(())
}

/// Attempt to acquire the lease for a task.
///
/// Succeeds when there is no current owner, the current owner's lease
/// expired, or this process already owns it. Returns false when another
/// live owner holds the lease; a missing task row is a `NotFound`
/// error, not a busy lease. Also moves the task to `running`.
pub fn acquire_lease(
    db: &Database,
    execution_id: &str,
    task_id: &str,
    owner: &str,
    lease_duration_ms: u64,
    now_ms: u64,
) -> Result<bool, StoreError> {
    let now = iso_from_ms(now_ms);
    let expires = iso_from_ms(now_ms + lease_duration_ms);

    db.with_tx(|tx| {
        let current: Option<(Option<String>, Option<String>)> = tx
            .query_row(
                "SELECT lease_owner, lease_expires_at FROM tasks
                 WHERE execution_id = ?1 AND id = ?2",
                [execution_id, task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some((current_owner, current_expires)) = current else {
            return Err(StoreError::NotFound { kind: "task", id: task_id.to_string() });
        };

        if let (Some(current_owner), Some(current_expires)) = (current_owner, current_expires) {
            if current_owner != owner && current_expires > now {
                return Ok(false);
            }
        }

        tx.execute(
            "UPDATE tasks
             SET lease_owner = ?3, lease_expires_at = ?4, heartbeat_at = ?5, status = 'running'
             WHERE execution_id = ?1 AND id = ?2",
            rusqlite::params![execution_id, task_id, owner, expires, now],
        )?;
        Ok(true)
    })
}

/// Extend the lease if this process still owns it. No-op otherwise.
pub fn heartbeat(
    db: &Database,
    execution_id: &str,
    task_id: &str,
    owner: &str,
    lease_duration_ms: u64,
    now_ms: u64,
) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE tasks SET lease_expires_at = ?4, heartbeat_at = ?5
             WHERE execution_id = ?1 AND id = ?2 AND lease_owner = ?3",
            rusqlite::params![
                execution_id,
                task_id,
                owner,
                iso_from_ms(now_ms + lease_duration_ms),
                iso_from_ms(now_ms),
            ],
        )
    })?;
    Ok(())
}

/// Clear the lease columns if this process owns them.
pub fn release_lease(
    db: &Database,
    execution_id: &str,
    task_id: &str,
    owner: &str,
) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE tasks SET lease_owner = NULL, lease_expires_at = NULL
             WHERE execution_id = ?1 AND id = ?2 AND lease_owner = ?3",
            [execution_id, task_id, owner],
        )
    })?;
    Ok(())
}

/// Tasks still marked running whose lease has expired.
pub fn find_orphans(db: &Database, now_ms: u64) -> Result<Vec<TaskRow>, StoreError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, execution_id, name, status, lease_owner, lease_expires_at,
                    heartbeat_at, retry_count, started_at, completed_at
             FROM tasks
             WHERE status = 'running'
               AND lease_expires_at IS NOT NULL
               AND lease_expires_at < ?1
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map([iso_from_ms(now_ms)], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    Ok(rows)
}

/// Reset an orphan for retry: pending status, bumped retry count, lease
/// cleared.
pub fn reset_for_retry(
    db: &Database,
    execution_id: &str,
    task_id: &str,
    retry_count: u32,
) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE tasks
             SET status = 'pending', retry_count = ?3,
                 lease_owner = NULL, lease_expires_at = NULL
             WHERE execution_id = ?1 AND id = ?2",
            rusqlite::params![execution_id, task_id, retry_count],
        )
    })?;
    Ok(())
}

/// Mark an orphan terminal: orphaned status, lease cleared.
pub fn mark_orphaned(db: &Database, execution_id: &str, task_id: &str) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE tasks
             SET status = 'orphaned', lease_owner = NULL, lease_expires_at = NULL
             WHERE execution_id = ?1 AND id = ?2",
            [execution_id, task_id],
        )
    })?;
    Ok(())
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    let status_text: String = row.get(3)?;
    Ok(TaskRow {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        name: row.get(2)?,
        status: status_text.parse().unwrap_or(TaskStatus::Pending),
        lease_owner: row.get(4)?,
        lease_expires_at: row.get(5)?,
        heartbeat_at: row.get(6)?,
        retry_count: row.get::<_, i64>(7)? as u32,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
