// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact store facade
//!
//! Thin typed wrappers over the artifacts table. Each write carries the
//! node and frame context the engine sets for the current phase.

use parking_lot::Mutex;
use serde_json::{json, Value};
use sm_core::{ArtifactKind, ArtifactRequest, Clock, NodeId};
use sm_store::{artifacts, Database, StoreError};
use std::sync::Arc;

pub struct ArtifactStore<C: Clock> {
    db: Arc<Database>,
    execution_id: String,
    clock: C,
    context: Mutex<(Option<NodeId>, Option<u64>)>,
}

impl<C: Clock> ArtifactStore<C> {
    pub fn new(db: Arc<Database>, execution_id: impl Into<String>, clock: C) -> Self {
        Self { db, execution_id: execution_id.into(), clock, context: Mutex::new((None, None)) }
    }

    /// Set the node/frame context stamped onto subsequent writes.
    pub fn set_context(&self, node_id: Option<NodeId>, frame_id: Option<u64>) {
        *self.context.lock() = (node_id, frame_id);
    }

    pub fn write(&self, request: &ArtifactRequest) -> Result<(), StoreError> {
        let (node_id, frame_id) = self.context.lock().clone();
        artifacts::write(
            &self.db,
            &self.execution_id,
            request,
            node_id.as_ref().map(NodeId::as_str),
            frame_id,
            self.clock.epoch_ms(),
        )
    }

    pub fn markdown(
        &self,
        name: &str,
        text: &str,
        key: Option<&str>,
    ) -> Result<(), StoreError> {
        self.write(&ArtifactRequest {
            kind: ArtifactKind::Markdown,
            name: name.to_string(),
            key: key.map(str::to_string),
            content: Value::String(text.to_string()),
        })
    }

    pub fn table(
        &self,
        name: &str,
        columns: &[&str],
        rows: &[Vec<Value>],
        key: Option<&str>,
    ) -> Result<(), StoreError> {
        self.write(&ArtifactRequest {
            kind: ArtifactKind::Table,
            name: name.to_string(),
            key: key.map(str::to_string),
            content: json!({ "columns": columns, "rows": rows }),
        })
    }

    pub fn progress(
        &self,
        name: &str,
        current: u64,
        total: u64,
        key: Option<&str>,
    ) -> Result<(), StoreError> {
        self.write(&ArtifactRequest {
            kind: ArtifactKind::Progress,
            name: name.to_string(),
            key: key.map(str::to_string),
            content: json!({ "current": current, "total": total }),
        })
    }

    pub fn link(&self, name: &str, url: &str, key: Option<&str>) -> Result<(), StoreError> {
        self.write(&ArtifactRequest {
            kind: ArtifactKind::Link,
            name: name.to_string(),
            key: key.map(str::to_string),
            content: json!({ "url": url }),
        })
    }

    pub fn image(&self, name: &str, path: &str, key: Option<&str>) -> Result<(), StoreError> {
        self.write(&ArtifactRequest {
            kind: ArtifactKind::Image,
            name: name.to_string(),
            key: key.map(str::to_string),
            content: json!({ "path": path }),
        })
    }
}
