// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema migrations
//!
//! Numbered migrations applied in order; the current version lives in
//! the `meta` table. Each migration is one SQL batch.

use crate::db::Database;
use crate::error::StoreError;

pub const SCHEMA_VERSION: i64 = 1;

const MIGRATION_1: &str = r#"
CREATE TABLE IF NOT EXISTS executions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    source_ref TEXT,
    config_json TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    stop_reason TEXT,
    iterations INTEGER NOT NULL DEFAULT 0,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    total_tool_calls INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS frames (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL REFERENCES executions(id),
    sequence INTEGER NOT NULL,
    plan_text TEXT NOT NULL,
    plan_hash TEXT NOT NULL,
    phase_marker TEXT,
    step_marker TEXT,
    mounted_ids_json TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    UNIQUE (execution_id, sequence)
);
CREATE INDEX IF NOT EXISTS idx_frames_exec ON frames(execution_id, sequence);

CREATE TABLE IF NOT EXISTS state (
    execution_id TEXT NOT NULL REFERENCES executions(id),
    key TEXT NOT NULL,
    value_json TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (execution_id, key)
);

CREATE TABLE IF NOT EXISTS transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL,
    key TEXT NOT NULL,
    old_value_json TEXT,
    new_value_json TEXT,
    trigger TEXT,
    node_id TEXT,
    frame_id INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transitions_exec ON transitions(execution_id, id);
CREATE INDEX IF NOT EXISTS idx_transitions_key ON transitions(execution_id, key);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT NOT NULL,
    execution_id TEXT NOT NULL REFERENCES executions(id),
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    lease_owner TEXT,
    lease_expires_at TEXT,
    heartbeat_at TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    completed_at TEXT,
    PRIMARY KEY (id, execution_id)
);
CREATE INDEX IF NOT EXISTS idx_tasks_lease ON tasks(lease_owner, lease_expires_at);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(execution_id, status);

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL REFERENCES executions(id),
    node_id TEXT NOT NULL,
    model TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    turns_used INTEGER NOT NULL DEFAULT 0,
    prompt_tokens INTEGER NOT NULL DEFAULT 0,
    completion_tokens INTEGER NOT NULL DEFAULT 0,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    output_text TEXT,
    output_json TEXT,
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_agents_node ON agents(execution_id, node_id);

CREATE TABLE IF NOT EXISTS tool_calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT NOT NULL REFERENCES agents(id),
    tool_name TEXT NOT NULL,
    input_json TEXT NOT NULL,
    output_json TEXT,
    error TEXT,
    started_at TEXT,
    ended_at TEXT,
    duration_ms INTEGER
);
CREATE INDEX IF NOT EXISTS idx_tool_calls_agent ON tool_calls(agent_id);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL,
    source TEXT NOT NULL,
    node_id TEXT,
    event_type TEXT NOT NULL,
    payload_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_exec ON events(execution_id, id);

CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL,
    node_id TEXT,
    frame_id INTEGER,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    key TEXT,
    content_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_artifacts_key
    ON artifacts(execution_id, key) WHERE key IS NOT NULL;

CREATE TABLE IF NOT EXISTS approvals (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload_json TEXT NOT NULL DEFAULT '{}',
    prompt TEXT NOT NULL,
    options_json TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'pending',
    responder TEXT,
    response_json TEXT,
    comment TEXT,
    requested_at TEXT NOT NULL,
    responded_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_approvals_pending
    ON approvals(execution_id, status);
"#;

const MIGRATIONS: &[&str] = &[MIGRATION_1];

/// Apply pending migrations. Idempotent; safe to call on every open.
pub fn migrate(db: &Database) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
    })?;

    let current = current_version(db)?;

    for (index, sql) in MIGRATIONS.iter().enumerate() {
        let version = index as i64 + 1;
        if version <= current {
            continue;
        }
        db.with_tx(|tx| {
            tx.execute_batch(sql).map_err(|e| StoreError::Migration {
                version,
                message: e.to_string(),
            })?;
            tx.execute(
                "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = ?1",
                [version.to_string()],
            )?;
            Ok(())
        })?;
        tracing::info!(version, "applied schema migration");
    }

    Ok(())
}

/// The schema version recorded in `meta`, or 0 for a fresh database.
pub fn current_version(db: &Database) -> Result<i64, StoreError> {
    let value: Option<String> = db.with_conn(|conn| {
        conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })
    })?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
