// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smithers serve`

use crate::components::built_in_registry;
use crate::exit_error::ExitError;
use crate::logging;
use sm_backend::EchoExecutor;
use sm_engine::EngineConfig;
use sm_server::{serve_http, serve_stdio, HttpConfig, ServerState};
use sm_store::Database;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

pub async fn serve(
    db_path: &Path,
    host: &str,
    port: u16,
    token: Option<String>,
    stdio: bool,
) -> Result<(), ExitError> {
    let _log_guard = logging::init(db_path, "server")
        .map_err(|e| ExitError::failure(format!("cannot open log file: {e}")))?;

    let db = Arc::new(Database::open(db_path)?);
    let state = ServerState::new(
        db,
        built_in_registry(),
        Arc::new(EchoExecutor),
        EngineConfig::default(),
        token,
    );

    if stdio {
        serve_stdio(state).await?;
        return Ok(());
    }

    let host: IpAddr = host
        .parse()
        .map_err(|_| ExitError::new(2, format!("invalid host address {host:?}")))?;
    serve_http(state, HttpConfig { host, port })
        .await
        .map_err(|e| ExitError::failure(e.to_string()))
}
