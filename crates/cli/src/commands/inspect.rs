// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smithers inspect <id>`

use crate::exit_error::ExitError;
use crate::output;
use sm_core::short;
use sm_store::{agents, executions, frames, tasks, transitions, Database};
use std::path::Path;

pub fn inspect(db_path: &Path, id: &str) -> Result<(), ExitError> {
    let db = Database::open(db_path)?;
    let resolved = executions::resolve_prefix(&db, id)?;
    let execution = executions::get(&db, &resolved)?
        .ok_or_else(|| ExitError::failure(format!("execution not found: {id}")))?;

    println!("execution  {}", execution.id);
    println!("name       {}", execution.name);
    if let Some(source) = &execution.source_ref {
        println!("source     {source}");
    }
    println!("status     {}", execution.status.as_str());
    if let Some(reason) = &execution.stop_reason {
        println!("reason     {reason}");
    }
    println!("created    {}", execution.created_at);
    if let Some(completed) = &execution.completed_at {
        println!("completed  {completed}");
    }
    println!(
        "counters   {} iterations, {} tokens, {} tool calls",
        execution.iterations, execution.total_tokens, execution.total_tool_calls
    );
    println!(
        "rows       {} frames, {} transitions",
        frames::count(&db, &resolved)?,
        transitions::count(&db, &resolved)?
    );

    let task_rows = tasks::list_for_execution(&db, &resolved)?;
    if !task_rows.is_empty() {
        println!("\ntasks");
        let table: Vec<Vec<String>> = task_rows
            .iter()
            .map(|t| {
                vec![
                    t.id.clone(),
                    t.name.clone(),
                    t.status.as_str().to_string(),
                    t.retry_count.to_string(),
                ]
            })
            .collect();
        output::print_table(&["node", "task", "status", "retries"], &table);
    }

    let runs = agents::recent_for_execution(&db, &resolved, 10)?;
    if !runs.is_empty() {
        println!("\nrecent agents");
        let table: Vec<Vec<String>> = runs
            .iter()
            .map(|run| {
                vec![
                    short(&run.id, 8).to_string(),
                    run.node_id.clone(),
                    run.model.clone(),
                    run.status.as_str().to_string(),
                    run.total_tokens.to_string(),
                ]
            })
            .collect();
        output::print_table(&["run", "node", "model", "status", "tokens"], &table);
    }

    Ok(())
}
