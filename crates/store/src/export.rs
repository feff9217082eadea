// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution export
//!
//! Produces a zip archive with one JSON file per table (rows scoped to
//! the execution) plus any log files the caller supplies.

use crate::db::Database;
use crate::error::StoreError;
use crate::{agents, approvals, artifacts, events, executions, frames, tasks, transitions};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Export one execution to a zip archive at `out_path`.
pub fn export_execution(
    db: &Database,
    execution_id: &str,
    out_path: &Path,
    log_files: &[std::path::PathBuf],
) -> Result<(), StoreError> {
    let execution = executions::get(db, execution_id)?.ok_or(StoreError::NotFound {
        kind: "execution",
        id: execution_id.to_string(),
    })?;

    let file = std::fs::File::create(out_path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default();

    let tables: Vec<(&str, Value)> = vec![
        ("executions.json", serde_json::to_value([&execution]).unwrap_or_default()),
        (
            "frames.json",
            serde_json::to_value(frames::list(db, execution_id, None, None)?)
                .unwrap_or_default(),
        ),
        ("state.json", state_rows(db, execution_id)?),
        (
            "transitions.json",
            serde_json::to_value(transitions::list(db, execution_id, None, u32::MAX)?)
                .unwrap_or_default(),
        ),
        (
            "tasks.json",
            serde_json::to_value(tasks::list_for_execution(db, execution_id)?)
                .unwrap_or_default(),
        ),
        (
            "agents.json",
            serde_json::to_value(agents::recent_for_execution(db, execution_id, u32::MAX)?)
                .unwrap_or_default(),
        ),
        (
            "events.json",
            serde_json::to_value(events::list_after(db, execution_id, 0, u32::MAX)?)
                .unwrap_or_default(),
        ),
        (
            "artifacts.json",
            serde_json::to_value(artifacts::list(db, execution_id)?).unwrap_or_default(),
        ),
        (
            "approvals.json",
            serde_json::to_value(all_approvals(db, execution_id)?).unwrap_or_default(),
        ),
    ];

    for (name, value) in tables {
        zip.start_file(name, options)
            .map_err(|e| StoreError::Export(e.to_string()))?;
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| StoreError::Export(e.to_string()))?;
        zip.write_all(text.as_bytes())?;
    }

    for log in log_files {
        let Some(name) = log.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(content) = std::fs::read(log) else {
            continue;
        };
        zip.start_file(format!("logs/{name}"), options)
            .map_err(|e| StoreError::Export(e.to_string()))?;
        zip.write_all(&content)?;
    }

    zip.finish().map_err(|e| StoreError::Export(e.to_string()))?;
    Ok(())
}

fn state_rows(db: &Database, execution_id: &str) -> Result<Value, StoreError> {
    let rows: Vec<(String, String, String)> = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT key, value_json, updated_at FROM state WHERE execution_id = ?1 ORDER BY key",
        )?;
        let rows = stmt
            .query_map([execution_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;

    let items: Vec<Value> = rows
        .into_iter()
        .map(|(key, value_json, updated_at)| {
            serde_json::json!({
                "key": key,
                "value": serde_json::from_str::<Value>(&value_json).unwrap_or(Value::Null),
                "updated_at": updated_at,
            })
        })
        .collect();
    Ok(Value::Array(items))
}

fn all_approvals(
    db: &Database,
    execution_id: &str,
) -> Result<Vec<crate::types::ApprovalRow>, StoreError> {
    // list_pending only returns open rows; the export wants everything.
    let mut pending = approvals::list_pending(db, execution_id)?;
    let resolved: Vec<String> = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM approvals WHERE execution_id = ?1 AND status != 'pending'",
        )?;
        let rows = stmt
            .query_map([execution_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;
    for id in resolved {
        if let Some(row) = approvals::get(db, &id)? {
            pending.push(row);
        }
    }
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::DurableStore;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn export_contains_one_file_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        executions::create(&db, "e1", "test", None, &Value::Null, 0).unwrap();

        let mut store = DurableStore::new(Arc::clone(&db), "e1");
        store.set("k", json!(1), None);
        store.commit(1_000).unwrap();

        let out = dir.path().join("export.zip");
        export_execution(&db, "e1", &out, &[]).unwrap();

        let file = std::fs::File::open(&out).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        for expected in [
            "executions.json",
            "frames.json",
            "state.json",
            "transitions.json",
            "tasks.json",
            "agents.json",
            "events.json",
            "artifacts.json",
            "approvals.json",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn export_unknown_execution_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let out = dir.path().join("export.zip");
        assert!(matches!(
            export_execution(&db, "ghost", &out, &[]),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn export_includes_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        executions::create(&db, "e1", "test", None, &Value::Null, 0).unwrap();

        let log = dir.path().join("run.log");
        std::fs::write(&log, "line one\n").unwrap();

        let out = dir.path().join("export.zip");
        export_execution(&db, "e1", &out, &[log]).unwrap();

        let file = std::fs::File::open(&out).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert!(zip.by_name("logs/run.log").is_ok());
    }
}
