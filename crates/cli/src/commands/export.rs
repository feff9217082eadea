// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smithers export <id>`

use crate::exit_error::ExitError;
use crate::logging;
use sm_core::short;
use sm_store::{executions, export, Database};
use std::path::{Path, PathBuf};

pub fn export(db_path: &Path, id: &str, output: Option<PathBuf>) -> Result<(), ExitError> {
    let db = Database::open(db_path)?;
    let resolved = executions::resolve_prefix(&db, id)?;

    let out_path = output
        .unwrap_or_else(|| PathBuf::from(format!("smithers-{}.zip", short(&resolved, 8))));

    let log_path = logging::execution_log_path(db_path, &resolved);
    let logs: Vec<PathBuf> = if log_path.exists() { vec![log_path] } else { Vec::new() };

    export::export_execution(&db, &resolved, &out_path, &logs)?;
    println!("exported {} to {}", short(&resolved, 8), out_path.display());
    Ok(())
}
