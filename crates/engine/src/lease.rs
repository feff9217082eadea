// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task leases, heartbeats, orphan recovery, and cancellation
//!
//! Every runnable task acquires a lease before executing and heartbeats
//! while it runs. On startup, tasks still marked running with expired
//! leases are orphans from a crashed process; the orphan policy decides
//! whether they retry or die.

use parking_lot::Mutex;
use sm_core::{Clock, NodeId};
use sm_store::{tasks, Database, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct LeaseConfig {
    pub duration: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { duration: Duration::from_secs(30), heartbeat_interval: Duration::from_secs(10) }
    }
}

/// Manages lease acquisition and automatic heartbeats for one process.
pub struct LeaseManager<C: Clock> {
    db: Arc<Database>,
    execution_id: String,
    process_id: String,
    config: LeaseConfig,
    clock: C,
    heartbeats: Mutex<HashMap<NodeId, tokio::task::JoinHandle<()>>>,
}

impl<C: Clock + 'static> LeaseManager<C> {
    pub fn new(
        db: Arc<Database>,
        execution_id: impl Into<String>,
        config: LeaseConfig,
        clock: C,
    ) -> Self {
        let process_id = format!("pid-{}-{}", std::process::id(), &uuid::Uuid::new_v4().to_string()[..8]);
        Self {
            db,
            execution_id: execution_id.into(),
            process_id,
            config,
            clock,
            heartbeats: Mutex::new(HashMap::new()),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Acquire the lease for a task. False when another live process
    /// owns it.
    pub fn acquire(&self, task_id: &NodeId) -> Result<bool, StoreError> {
        tasks::acquire_lease(
            &self.db,
            &self.execution_id,
            task_id.as_str(),
            &self.process_id,
            self.config.duration.as_millis() as u64,
            self.clock.epoch_ms(),
        )
    }

    /// Extend the lease once. No-op if this process no longer owns it.
    pub fn heartbeat(&self, task_id: &NodeId) -> Result<(), StoreError> {
        tasks::heartbeat(
            &self.db,
            &self.execution_id,
            task_id.as_str(),
            &self.process_id,
            self.config.duration.as_millis() as u64,
            self.clock.epoch_ms(),
        )
    }

    /// Release the lease and stop its heartbeat task.
    pub fn release(&self, task_id: &NodeId) -> Result<(), StoreError> {
        self.stop_heartbeat(task_id);
        tasks::release_lease(&self.db, &self.execution_id, task_id.as_str(), &self.process_id)
    }

    /// Spawn the automatic heartbeat loop for a running task.
    pub fn start_heartbeat(&self, task_id: NodeId) {
        let mut heartbeats = self.heartbeats.lock();
        if heartbeats.contains_key(&task_id) {
            return;
        }

        let db = Arc::clone(&self.db);
        let execution_id = self.execution_id.clone();
        let process_id = self.process_id.clone();
        let duration_ms = self.config.duration.as_millis() as u64;
        let interval = self.config.heartbeat_interval;
        let clock = self.clock.clone();
        let id = task_id.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let beat = tasks::heartbeat(
                    &db,
                    &execution_id,
                    id.as_str(),
                    &process_id,
                    duration_ms,
                    clock.epoch_ms(),
                );
                if let Err(e) = beat {
                    tracing::warn!(task_id = %id, "heartbeat failed: {e}");
                }
            }
        });
        heartbeats.insert(task_id, handle);
    }

    pub fn stop_heartbeat(&self, task_id: &NodeId) {
        if let Some(handle) = self.heartbeats.lock().remove(task_id) {
            handle.abort();
        }
    }
}

/// Policy for handling orphaned tasks on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanPolicy {
    Retry,
    Fail,
    Ignore,
}

/// What the orphan sweep did for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanAction {
    RetryTask { task_id: String, retry_count: u32 },
    MarkFailed { task_id: String },
}

/// Scan for tasks with expired leases and apply the policy.
pub fn recover_orphans<C: Clock>(
    db: &Database,
    policy: OrphanPolicy,
    max_retries: u32,
    clock: &C,
) -> Result<Vec<OrphanAction>, StoreError> {
    let now_ms = clock.epoch_ms();
    let orphans = tasks::find_orphans(db, now_ms)?;
    let mut actions = Vec::new();

    for task in orphans {
        match policy {
            OrphanPolicy::Ignore => {
                tasks::mark_orphaned(db, &task.execution_id, &task.id)?;
            }
            OrphanPolicy::Retry if task.retry_count < max_retries => {
                let retry_count = task.retry_count + 1;
                tasks::reset_for_retry(db, &task.execution_id, &task.id, retry_count)?;
                tracing::info!(task_id = %task.id, retry_count, "orphan scheduled for retry");
                actions.push(OrphanAction::RetryTask { task_id: task.id, retry_count });
            }
            OrphanPolicy::Retry | OrphanPolicy::Fail => {
                tasks::mark_orphaned(db, &task.execution_id, &task.id)?;
                tracing::warn!(task_id = %task.id, "orphan marked failed");
                actions.push(OrphanAction::MarkFailed { task_id: task.id });
            }
        }
    }

    Ok(actions)
}

/// Per-task cancel signals.
///
/// `request_cancel` sets the signal; the running task observes it at
/// its suspension points. A task completing before it honors the
/// signal still gets its result recorded, but handlers never fire.
#[derive(Default)]
pub struct CancellationHandler {
    signals: Mutex<HashMap<NodeId, CancellationToken>>,
}

impl CancellationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a task; created on first sight.
    pub fn token(&self, task_id: &NodeId) -> CancellationToken {
        self.signals.lock().entry(task_id.clone()).or_default().clone()
    }

    pub fn request_cancel(&self, task_id: &NodeId) {
        self.token(task_id).cancel();
        tracing::info!(task_id = %task_id, "cancellation requested");
    }

    pub fn is_cancelled(&self, task_id: &NodeId) -> bool {
        self.signals.lock().get(task_id).map(|t| t.is_cancelled()).unwrap_or(false)
    }

    /// Drop the signal once the task reaches a terminal state.
    pub fn clear(&self, task_id: &NodeId) {
        self.signals.lock().remove(task_id);
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
