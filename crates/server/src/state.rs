// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared server context
//!
//! One `ServerState` backs every transport: the database, the
//! component registry, live engine handles, the session manager, and
//! the event stream hub.

use crate::registry::ComponentRegistry;
use crate::session::SessionManager;
use crate::stream::EventStreamHub;
use parking_lot::Mutex;
use serde_json::Value;
use sm_backend::AgentExecutor;
use sm_core::{Clock, ExecutionId, SystemClock};
use sm_engine::{EngineCommand, EngineConfig, EngineHandle, TickLoop};
use sm_rpc::JsonRpcError;
use sm_store::{executions, Database};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct ServerState {
    pub db: Arc<Database>,
    pub registry: ComponentRegistry,
    pub executor: Arc<dyn AgentExecutor>,
    pub engine_config: EngineConfig,
    pub sessions: SessionManager,
    pub hub: Arc<EventStreamHub>,
    pub clock: SystemClock,
    /// Pre-shared bearer token required by the HTTP transport.
    pub auth_token: Option<String>,
    handles: Mutex<HashMap<String, EngineHandle>>,
}

impl ServerState {
    pub fn new(
        db: Arc<Database>,
        registry: ComponentRegistry,
        executor: Arc<dyn AgentExecutor>,
        engine_config: EngineConfig,
        auth_token: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            registry,
            executor,
            engine_config,
            sessions: SessionManager::default(),
            hub: Arc::new(EventStreamHub::default()),
            clock: SystemClock,
            auth_token,
            handles: Mutex::new(HashMap::new()),
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Create (or resume) an execution and spawn its engine loop in
    /// serve mode. Returns the execution id.
    pub fn start_execution(
        &self,
        script: &str,
        name: Option<&str>,
        execution_id: Option<&str>,
        config: &Value,
    ) -> Result<String, JsonRpcError> {
        let component = self
            .registry
            .resolve(script)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("unknown script: {script}")))?;

        let execution_id = match execution_id {
            Some(id) => ExecutionId::from_string(id),
            None => ExecutionId::new(),
        };

        let existing = executions::get(&self.db, execution_id.as_str())
            .map_err(|e| JsonRpcError::internal(e.to_string()))?;
        if existing.is_none() {
            executions::create(
                &self.db,
                execution_id.as_str(),
                name.unwrap_or(script),
                Some(script),
                config,
                self.now_ms(),
            )
            .map_err(|e| JsonRpcError::internal(e.to_string()))?;
        }

        let (tick, mut events_rx) = TickLoop::new(
            Arc::clone(&self.db),
            execution_id.clone(),
            component,
            Arc::clone(&self.executor),
            SystemClock,
            self.engine_config.clone(),
        )
        .map_err(|e| JsonRpcError::internal(e.to_string()))?;

        // Forward engine events into the shared stream hub.
        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                hub.publish(&event);
            }
        });

        let (commands_tx, commands_rx) = mpsc::unbounded_channel::<EngineCommand>();
        tokio::spawn(tick.serve(commands_rx));

        self.handles
            .lock()
            .insert(execution_id.to_string(), EngineHandle::new(commands_tx));
        tracing::info!(execution_id = %execution_id, script, "execution started");
        Ok(execution_id.to_string())
    }

    /// Engine handle for an execution id or unique prefix.
    pub fn handle(&self, execution_id: &str) -> Result<EngineHandle, JsonRpcError> {
        let resolved = executions::resolve_prefix(&self.db, execution_id)
            .map_err(|_| JsonRpcError::resource_not_found(execution_id))?;
        self.handles
            .lock()
            .get(&resolved)
            .cloned()
            .ok_or_else(|| {
                JsonRpcError::invalid_params(format!("execution {resolved} has no live engine"))
            })
    }

    pub fn drop_handle(&self, execution_id: &str) {
        self.handles.lock().remove(execution_id);
    }
}
