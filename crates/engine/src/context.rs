// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-frame context and the purity-guarded state views
//!
//! The component receives read-only snapshots frozen in phase 1 plus a
//! frozen frame clock. Writes through the context are queued for the
//! flush phase; attempting one during render records a violation and
//! returns the error. `init` is the single escape hatch: during render
//! it may queue a write for a key that is not already set.

use parking_lot::Mutex;
use serde_json::Value;
use sm_core::{current_phase, FramePhase, Node, RenderPhaseError};
use sm_store::{agents, frames, tasks, AgentRow, Database, FrameRow, StoreError, TaskRow};
use std::collections::HashMap;
use std::sync::Arc;

/// The author-supplied component: pure function from context to plan.
pub type Component = Arc<dyn Fn(&Context) -> Node + Send + Sync>;

/// Read-only database view handed to components. Queries are always
/// allowed; there is no write surface here, so render purity holds by
/// construction.
#[derive(Clone)]
pub struct DbView {
    db: Arc<Database>,
    execution_id: String,
}

impl DbView {
    pub fn new(db: Arc<Database>, execution_id: impl Into<String>) -> Self {
        Self { db, execution_id: execution_id.into() }
    }

    pub fn task(&self, node_id: &str) -> Result<Option<TaskRow>, StoreError> {
        tasks::get(&self.db, &self.execution_id, node_id)
    }

    pub fn frame_count(&self) -> Result<u64, StoreError> {
        frames::count(&self.db, &self.execution_id)
    }

    pub fn frame(&self, sequence: u64) -> Result<Option<FrameRow>, StoreError> {
        frames::get(&self.db, &self.execution_id, sequence)
    }

    pub fn agent_runs(&self, node_id: &str) -> Result<Vec<AgentRow>, StoreError> {
        agents::list_for_node(&self.db, &self.execution_id, node_id)
    }
}

/// One queued context write, drained into the action queue post-render.
#[derive(Debug, Clone, PartialEq)]
pub struct CtxWrite {
    pub key: String,
    pub value: Option<Value>,
    pub trigger: String,
}

#[derive(Default)]
struct GuardInner {
    writes: Vec<CtxWrite>,
    violations: Vec<RenderPhaseError>,
}

/// Guarded view over the durable state snapshot.
pub struct GuardedState {
    snapshot: HashMap<String, Value>,
    inner: Mutex<GuardInner>,
}

impl GuardedState {
    pub fn new(snapshot: HashMap<String, Value>) -> Self {
        Self { snapshot, inner: Mutex::new(GuardInner::default()) }
    }

    /// Read from the frame snapshot. Always allowed.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.snapshot.get(key)
    }

    pub fn snapshot(&self) -> &HashMap<String, Value> {
        &self.snapshot
    }

    /// Queue a write for the flush phase. Errors during render.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<(), RenderPhaseError> {
        let key = key.into();
        let mut inner = self.inner.lock();
        if current_phase() == FramePhase::Render {
            let error = RenderPhaseError::Write { key };
            inner.violations.push(error.clone());
            return Err(error);
        }
        inner.writes.push(CtxWrite { key, value: Some(value), trigger: "ctx.set".to_string() });
        Ok(())
    }

    /// Queue a delete for the flush phase. Errors during render.
    pub fn delete(&self, key: impl Into<String>) -> Result<(), RenderPhaseError> {
        let key = key.into();
        let mut inner = self.inner.lock();
        if current_phase() == FramePhase::Render {
            let error = RenderPhaseError::Write { key };
            inner.violations.push(error.clone());
            return Err(error);
        }
        inner.writes.push(CtxWrite { key, value: None, trigger: "ctx.delete".to_string() });
        Ok(())
    }

    /// Initialization escape hatch: queues a write only when the key is
    /// absent. Permitted even during render; a no-op for present keys.
    /// Returns true when the write was queued.
    pub fn init(&self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if self.snapshot.contains_key(&key) {
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.writes.iter().any(|w| w.key == key) {
            return false;
        }
        inner.writes.push(CtxWrite { key, value: Some(value), trigger: "init".to_string() });
        true
    }

    pub fn take_writes(&self) -> Vec<CtxWrite> {
        std::mem::take(&mut self.inner.lock().writes)
    }

    pub fn violations(&self) -> Vec<RenderPhaseError> {
        self.inner.lock().violations.clone()
    }
}

/// Guarded view over the volatile snapshot. Same rules as the durable
/// view; writes land in the volatile tier.
pub struct GuardedVolatile {
    snapshot: HashMap<String, Value>,
    inner: Mutex<GuardInner>,
}

impl GuardedVolatile {
    pub fn new(snapshot: HashMap<String, Value>) -> Self {
        Self { snapshot, inner: Mutex::new(GuardInner::default()) }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.snapshot.get(key)
    }

    pub fn snapshot(&self) -> &HashMap<String, Value> {
        &self.snapshot
    }

    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<(), RenderPhaseError> {
        let key = key.into();
        let mut inner = self.inner.lock();
        if current_phase() == FramePhase::Render {
            let error = RenderPhaseError::Write { key };
            inner.violations.push(error.clone());
            return Err(error);
        }
        inner.writes.push(CtxWrite { key, value: Some(value), trigger: "ctx.v.set".to_string() });
        Ok(())
    }

    pub fn take_writes(&self) -> Vec<CtxWrite> {
        std::mem::take(&mut self.inner.lock().writes)
    }

    pub fn violations(&self) -> Vec<RenderPhaseError> {
        self.inner.lock().violations.clone()
    }
}

/// Frame context handed to the component.
pub struct Context {
    pub state: GuardedState,
    pub v: GuardedVolatile,
    pub frame_id: u64,
    now_ms: u64,
    db: Option<DbView>,
}

impl Context {
    pub fn new(
        state_snapshot: HashMap<String, Value>,
        volatile_snapshot: HashMap<String, Value>,
        frame_id: u64,
        now_ms: u64,
    ) -> Self {
        Self {
            state: GuardedState::new(state_snapshot),
            v: GuardedVolatile::new(volatile_snapshot),
            frame_id,
            now_ms,
            db: None,
        }
    }

    pub fn with_db(mut self, db: DbView) -> Self {
        self.db = Some(db);
        self
    }

    /// Read-only database view, when the engine attached one.
    pub fn db(&self) -> Option<&DbView> {
        self.db.as_ref()
    }

    /// Frame-frozen wall clock in epoch milliseconds. Every read within
    /// one frame sees the same value.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// All purity violations recorded through either view.
    pub fn violations(&self) -> Vec<RenderPhaseError> {
        let mut all = self.state.violations();
        all.extend(self.v.violations());
        all
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
