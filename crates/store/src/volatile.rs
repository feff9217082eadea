// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volatile (in-memory) store
//!
//! Same contract as the durable store minus persistence: `set` queues,
//! nothing is observable until `commit()`, a `None` value deletes, and
//! the version counter bumps once per commit.

use crate::types::WriteOp;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct VolatileStore {
    data: HashMap<String, Value>,
    version: u64,
    queue: Vec<WriteOp>,
}

impl VolatileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently committed value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
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

    /// Deep copy of the committed map. Later commits never mutate a
    /// snapshot taken earlier.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data.clone()
    }

    /// Apply all queued ops in order and bump the version.
    pub fn commit(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        for op in self.queue.drain(..) {
            match op.value {
                Some(value) => {
                    self.data.insert(op.key, value);
                }
                None => {
                    self.data.remove(&op.key);
                }
            }
        }
        self.version += 1;
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Discard queued ops without applying.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
#[path = "volatile_tests.rs"]
mod tests;
