// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smithers run <script>`

use crate::components::built_in_registry;
use crate::exit_error::ExitError;
use crate::{env, logging};
use serde_json::Value;
use sm_backend::EchoExecutor;
use sm_core::{ExecutionId, ExecutionStatus, SystemClock};
use sm_engine::{EngineConfig, TickLoop};
use sm_store::{executions, Database};
use std::path::Path;
use std::sync::Arc;

pub async fn run(db_path: &Path, script: &str, name: Option<String>) -> Result<(), ExitError> {
    let registry = built_in_registry();
    let component = registry.resolve(script).ok_or_else(|| {
        ExitError::new(2, format!("unknown script {script:?}; registered: {:?}", registry.names()))
    })?;

    let db = Arc::new(Database::open(db_path)?);
    let clock = SystemClock;

    // SMITHERS_EXECUTION_ID forces the id so a run can resume.
    let execution_id = match env::forced_execution_id() {
        Some(id) => ExecutionId::from_string(id),
        None => ExecutionId::new(),
    };

    let current = sm_core::ResumeContext {
        script_hash: script_hash(script),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: sm_store::schema::SCHEMA_VERSION,
    };
    match executions::get(&db, execution_id.as_str())? {
        None => {
            let signature = sm_core::compute_execution_signature(
                &current.script_hash,
                &current.engine_version,
                current.schema_version,
            );
            let config = serde_json::json!({
                "signature": signature,
                "script_hash": current.script_hash,
                "engine_version": current.engine_version,
                "schema_version": current.schema_version,
            });
            executions::create(
                &db,
                execution_id.as_str(),
                name.as_deref().unwrap_or(script),
                Some(script),
                &config,
                sm_core::Clock::epoch_ms(&clock),
            )?;
        }
        Some(existing) => {
            // Resume: compare the saved execution context and warn on
            // drift; identity may no longer line up.
            let saved = sm_core::ResumeContext {
                script_hash: existing.config["script_hash"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                engine_version: existing.config["engine_version"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                schema_version: existing.config["schema_version"].as_i64().unwrap_or(0),
            };
            for warning in sm_core::validate_resume(&saved, &current) {
                eprintln!("warning: {warning}");
            }
        }
    }

    let _log_guard = logging::init(db_path, execution_id.as_str())
        .map_err(|e| ExitError::failure(format!("cannot open log file: {e}")))?;

    let (mut tick, mut events_rx) = TickLoop::new(
        Arc::clone(&db),
        execution_id.clone(),
        component,
        Arc::new(EchoExecutor),
        clock,
        EngineConfig::default(),
    )?;

    // Drain engine events into the log.
    let event_logger = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let fields = event
                .fields()
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            tracing::info!(target: "smithers::event", "{} {}", event.method(), fields);
        }
    });

    println!("execution {execution_id}");
    let status = tick.run().await?;
    event_logger.abort();

    match status {
        ExecutionStatus::Completed => {
            println!("completed");
            Ok(())
        }
        other => Err(ExitError::failure(format!("execution ended {}", other.as_str()))),
    }
}

/// Hash of the script reference. Registry scripts have no file content,
/// so the reference itself is the identity.
fn script_hash(script: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(script.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}
