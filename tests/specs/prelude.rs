// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared spec harness

pub use serde_json::{json, Value};
pub use sm_backend::{AgentExecutor, FakeExecutor};
pub use sm_core::{
    ClaudeNode, ExecutionId, ExecutionStatus, Node, SystemClock, TaskStatus,
};
pub use sm_engine::{Component, EngineConfig, TickLoop};
pub use sm_store::{executions, frames, tasks, transitions, Database, DurableStore};
pub use std::sync::Arc;
pub use std::time::Duration;

/// Engine config with throttling and idle grace disabled.
pub fn spec_config() -> EngineConfig {
    EngineConfig {
        min_frame_interval: Duration::ZERO,
        idle_timeout: Duration::ZERO,
        ..EngineConfig::default()
    }
}

pub struct Spec {
    pub db: Arc<Database>,
    pub executor: Arc<FakeExecutor>,
    pub execution_id: ExecutionId,
}

impl Spec {
    /// Fresh in-memory database with one pending execution.
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let execution_id = ExecutionId::new();
        executions::create(&db, execution_id.as_str(), "spec", None, &Value::Null, 0).unwrap();
        Self { db, executor: Arc::new(FakeExecutor::new()), execution_id }
    }

    /// Same, but on disk so a second "process" can reopen it.
    pub fn on_disk(dir: &std::path::Path) -> Self {
        let db = Arc::new(Database::open(dir.join("db.sqlite")).unwrap());
        let execution_id = ExecutionId::new();
        executions::create(&db, execution_id.as_str(), "spec", None, &Value::Null, 0).unwrap();
        Self { db, executor: Arc::new(FakeExecutor::new()), execution_id }
    }

    pub fn tick_loop(
        &self,
        component: Component,
    ) -> TickLoop<SystemClock> {
        let (tick, _events) = TickLoop::new(
            Arc::clone(&self.db),
            self.execution_id.clone(),
            component,
            Arc::clone(&self.executor) as Arc<dyn AgentExecutor>,
            SystemClock,
            spec_config(),
        )
        .unwrap();
        tick
    }

    pub fn seed_state(&self, key: &str, value: Value) {
        let mut store = DurableStore::new(Arc::clone(&self.db), self.execution_id.as_str());
        store.set(key, value, Some("spec:seed".to_string()));
        store.commit(0).unwrap();
    }

    pub fn state_value(&self, key: &str) -> Option<Value> {
        DurableStore::new(Arc::clone(&self.db), self.execution_id.as_str())
            .get(key)
            .unwrap()
    }

    pub fn execution(&self) -> sm_store::ExecutionRow {
        executions::get(&self.db, self.execution_id.as_str()).unwrap().unwrap()
    }

    pub fn task(&self, node_id: &str) -> Option<sm_store::TaskRow> {
        tasks::get(&self.db, self.execution_id.as_str(), node_id).unwrap()
    }

    pub fn frame_count(&self) -> u64 {
        frames::count(&self.db, self.execution_id.as_str()).unwrap()
    }

    pub fn transition_count(&self) -> u64 {
        transitions::count(&self.db, self.execution_id.as_str()).unwrap()
    }
}
