// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Approval broker
//!
//! `request` persists a pending approval row, announces it, and blocks
//! the calling task until someone responds or the timeout passes.
//! Expiry is treated as denial with a synthetic comment.

use parking_lot::Mutex;
use serde_json::Value;
use sm_core::{ApprovalId, Clock, EngineEvent, ExecutionId, NodeId};
use sm_store::{approvals, ApprovalRow, ApprovalStatus, Database, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// What the requesting task sees once the approval resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOutcome {
    pub id: ApprovalId,
    pub approved: bool,
    pub status: ApprovalStatus,
    pub response: Option<Value>,
    pub comment: Option<String>,
}

impl ApprovalOutcome {
    fn from_row(row: &ApprovalRow) -> Self {
        Self {
            id: ApprovalId::from_string(row.id.clone()),
            approved: row.status == ApprovalStatus::Approved,
            status: row.status,
            response: row.response.clone(),
            comment: row.comment.clone(),
        }
    }
}

pub struct ApprovalBroker<C: Clock> {
    db: Arc<Database>,
    clock: C,
    waiters: Mutex<HashMap<String, Arc<Notify>>>,
    events: tokio::sync::mpsc::UnboundedSender<EngineEvent>,
}

impl<C: Clock> ApprovalBroker<C> {
    pub fn new(
        db: Arc<Database>,
        clock: C,
        events: tokio::sync::mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self { db, clock, waiters: Mutex::new(HashMap::new()), events }
    }

    /// Create a pending request and block until resolved or timed out.
    #[allow(clippy::too_many_arguments)]
    pub async fn request(
        &self,
        execution_id: &ExecutionId,
        node_id: &NodeId,
        kind: &str,
        payload: &Value,
        prompt: &str,
        options: &[String],
        timeout: Duration,
    ) -> Result<ApprovalOutcome, StoreError> {
        let id = ApprovalId::new();
        approvals::create(
            &self.db,
            id.as_str(),
            execution_id.as_str(),
            node_id.as_str(),
            kind,
            payload,
            prompt,
            options,
            self.clock.epoch_ms(),
        )?;

        let notify = Arc::new(Notify::new());
        self.waiters.lock().insert(id.as_str().to_string(), Arc::clone(&notify));

        let _ = self.events.send(EngineEvent::ApprovalRequested {
            execution_id: execution_id.clone(),
            approval_id: id.clone(),
            node_id: node_id.clone(),
            prompt: prompt.to_string(),
        });
        tracing::info!(approval_id = %id, node_id = %node_id, "approval requested");

        let outcome = self.wait(&id, timeout).await;
        self.waiters.lock().remove(id.as_str());
        outcome
    }

    async fn wait(&self, id: &ApprovalId, timeout: Duration) -> Result<ApprovalOutcome, StoreError> {
        // Poll as well as waiting on the notify: responses written by
        // another process never ring our in-process bell.
        const POLL: Duration = Duration::from_millis(500);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(row) = approvals::get(&self.db, id.as_str())? {
                if row.status != ApprovalStatus::Pending {
                    return Ok(ApprovalOutcome::from_row(&row));
                }
            }

            if tokio::time::Instant::now() >= deadline {
                // Timed out: expire the row (denial) unless a response
                // raced in.
                approvals::expire(&self.db, id.as_str(), self.clock.epoch_ms())?;
                let row = approvals::get(&self.db, id.as_str())?.ok_or(StoreError::NotFound {
                    kind: "approval",
                    id: id.to_string(),
                })?;
                return Ok(ApprovalOutcome::from_row(&row));
            }

            let notify = {
                let waiters = self.waiters.lock();
                waiters.get(id.as_str()).cloned()
            };
            let Some(notify) = notify else {
                continue;
            };

            let poll_deadline = (tokio::time::Instant::now() + POLL).min(deadline);
            let _ = tokio::time::timeout_at(poll_deadline, notify.notified()).await;
        }
    }

    /// Resolve a pending request and wake its waiter.
    pub fn respond(
        &self,
        id: &str,
        approved: bool,
        responder: &str,
        comment: Option<&str>,
        data: Option<&Value>,
    ) -> Result<ApprovalOutcome, StoreError> {
        let row = approvals::respond(
            &self.db,
            id,
            approved,
            responder,
            comment,
            data,
            self.clock.epoch_ms(),
        )?;

        if let Some(notify) = self.waiters.lock().get(id) {
            notify.notify_one();
        }
        Ok(ApprovalOutcome::from_row(&row))
    }

    /// Pending requests for an execution.
    pub fn pending(&self, execution_id: &str) -> Result<Vec<ApprovalRow>, StoreError> {
        approvals::list_pending(&self.db, execution_id)
    }
}

#[cfg(test)]
#[path = "approvals_tests.rs"]
mod tests;
