// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smithers db <table> <id>`

use crate::exit_error::ExitError;
use crate::output;
use clap::Subcommand;
use sm_core::canonical_json;
use sm_store::{executions, frames, transitions, Database, DurableStore};
use std::path::Path;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum DbCommand {
    /// Current durable state for an execution
    State { id: String },
    /// Transition audit log
    Transitions {
        id: String,
        #[arg(long, default_value_t = 20)]
        last: u32,
    },
    /// Committed frames
    Frames {
        id: String,
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
    },
}

pub fn run(db_path: &Path, command: DbCommand) -> Result<(), ExitError> {
    let db = Arc::new(Database::open(db_path)?);

    match command {
        DbCommand::State { id } => {
            let resolved = executions::resolve_prefix(&db, &id)?;
            let store = DurableStore::new(Arc::clone(&db), resolved);
            let snapshot = store.snapshot()?;
            let mut keys: Vec<&String> = snapshot.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(value) = snapshot.get(key) {
                    println!("{key} = {}", canonical_json(value));
                }
            }
        }
        DbCommand::Transitions { id, last } => {
            let resolved = executions::resolve_prefix(&db, &id)?;
            let rows = transitions::list(&db, &resolved, None, last)?;
            let table: Vec<Vec<String>> = rows
                .iter()
                .map(|t| {
                    vec![
                        t.frame_id.map(|f| f.to_string()).unwrap_or_else(|| "-".to_string()),
                        t.key.clone(),
                        t.old_value.as_ref().map(canonical_json).unwrap_or_else(|| "∅".to_string()),
                        t.new_value.as_ref().map(canonical_json).unwrap_or_else(|| "∅".to_string()),
                        t.trigger.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            output::print_table(&["frame", "key", "old", "new", "trigger"], &table);
        }
        DbCommand::Frames { id, from, to } => {
            let resolved = executions::resolve_prefix(&db, &id)?;
            for frame in frames::list(&db, &resolved, from, to)? {
                println!(
                    "── frame {} ({}, {}) ──",
                    frame.sequence,
                    frame.plan_hash,
                    frame.created_at
                );
                print!("{}", frame.plan_text);
            }
        }
    }
    Ok(())
}
