// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smithers list`

use crate::exit_error::ExitError;
use crate::output;
use sm_core::short;
use sm_store::{executions, Database};
use std::path::Path;

pub fn list(db_path: &Path, limit: u32) -> Result<(), ExitError> {
    let db = Database::open(db_path)?;
    let rows = executions::list_recent(&db, limit)?;

    if rows.is_empty() {
        println!("no executions");
        return Ok(());
    }

    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                short(&row.id, 8).to_string(),
                row.name.clone(),
                row.status.as_str().to_string(),
                row.iterations.to_string(),
                row.total_tokens.to_string(),
                output::format_time_ago(&row.created_at),
            ]
        })
        .collect();

    output::print_table(&["id", "name", "status", "iters", "tokens", "age"], &table);
    Ok(())
}
