// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, execution-scoped state store
//!
//! Same queue contract as the volatile store. `commit()` wraps every
//! queued write plus its transition-log row in a single transaction:
//! either all of it lands or none of it does, and the queue is retained
//! on failure so a retry can re-commit.

use crate::db::{iso_from_ms, Database};
use crate::error::StoreError;
use crate::types::WriteOp;
use serde_json::Value;
use sm_core::canonical_json;
use std::collections::HashMap;
use std::sync::Arc;

pub struct DurableStore {
    db: Arc<Database>,
    execution_id: String,
    queue: Vec<WriteOp>,
}

impl DurableStore {
    pub fn new(db: Arc<Database>, execution_id: impl Into<String>) -> Self {
        Self { db, execution_id: execution_id.into(), queue: Vec::new() }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Committed value for a key.
    pub fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let text: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value_json FROM state WHERE execution_id = ?1 AND key = ?2",
                [self.execution_id.as_str(), key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })?;

        match text {
            None => Ok(None),
            Some(text) => {
                let value = serde_json::from_str(&text).map_err(|e| {
                    StoreError::Serialization { key: key.to_string(), message: e.to_string() }
                })?;
                Ok(Some(value))
            }
        }
    }

    /// Queue a write. Not applied until [`commit`](Self::commit).
    pub fn set(&mut self, key: impl Into<String>, value: Value, trigger: Option<String>) {
        self.queue.push(WriteOp {
            key: key.into(),
            value: Some(value),
            trigger,
            node_id: None,
            frame_id: None,
        });
    }

    /// Queue a write of any serializable value. Fails here (rather than
    /// at commit) when the value cannot become canonical JSON.
    pub fn set_serialize<T: serde::Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
        trigger: Option<String>,
    ) -> Result<(), StoreError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| StoreError::Serialization {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.set(key, value, trigger);
        Ok(())
    }

    /// Queue a delete.
    pub fn delete(&mut self, key: impl Into<String>, trigger: Option<String>) {
        self.queue.push(WriteOp {
            key: key.into(),
            value: None,
            trigger,
            node_id: None,
            frame_id: None,
        });
    }

    /// Queue multiple writes.
    pub fn enqueue(&mut self, ops: impl IntoIterator<Item = WriteOp>) {
        self.queue.extend(ops);
    }

    /// Deep copy of the committed map. Reads see the database as of the
    /// call; queued writes are not visible.
    pub fn snapshot(&self) -> Result<HashMap<String, Value>, StoreError> {
        let rows: Vec<(String, String)> = self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, value_json FROM state WHERE execution_id = ?1")?;
            let rows = stmt
                .query_map([self.execution_id.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let mut map = HashMap::with_capacity(rows.len());
        for (key, text) in rows {
            let value = serde_json::from_str(&text).map_err(|e| StoreError::Serialization {
                key: key.clone(),
                message: e.to_string(),
            })?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Apply all queued writes and their transition rows atomically.
    ///
    /// On error the queue is retained so the caller can retry or
    /// inspect; on success it is cleared.
    pub fn commit(&mut self, now_ms: u64) -> Result<(), StoreError> {
        if self.queue.is_empty() {
            return Ok(());
        }

        let execution_id = self.execution_id.clone();
        let queue = self.queue.clone();
        let stamp = iso_from_ms(now_ms);

        self.db.with_tx(|tx| {
            for op in &queue {
                let old: Option<String> = tx
                    .query_row(
                        "SELECT value_json FROM state WHERE execution_id = ?1 AND key = ?2",
                        [execution_id.as_str(), op.key.as_str()],
                        |row| row.get(0),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                let new = op.value.as_ref().map(canonical_json);

                match &new {
                    Some(text) => {
                        tx.execute(
                            "INSERT INTO state (execution_id, key, value_json, updated_at)
                             VALUES (?1, ?2, ?3, ?4)
                             ON CONFLICT(execution_id, key)
                             DO UPDATE SET value_json = ?3, updated_at = ?4",
                            rusqlite::params![execution_id, op.key, text, stamp],
                        )?;
                    }
                    None => {
                        tx.execute(
                            "DELETE FROM state WHERE execution_id = ?1 AND key = ?2",
                            [execution_id.as_str(), op.key.as_str()],
                        )?;
                    }
                }

                tx.execute(
                    "INSERT INTO transitions
                     (execution_id, key, old_value_json, new_value_json, trigger, node_id, frame_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        execution_id,
                        op.key,
                        old,
                        new,
                        op.trigger,
                        op.node_id,
                        op.frame_id.map(|f| f as i64),
                        stamp,
                    ],
                )?;
            }
            Ok(())
        })?;

        self.queue.clear();
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Discard queued writes without applying.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("execution_id", &self.execution_id)
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "durable_tests.rs"]
mod tests;
