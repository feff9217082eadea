// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! smithers: CLI for the Smithers orchestration engine

mod commands;
mod components;
mod env;
mod exit_error;
mod logging;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "smithers", version, about = "Durable multi-agent orchestration engine")]
struct Cli {
    /// Database file (default .smithers/db.sqlite, or SMITHERS_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a registered script to quiescence
    Run {
        /// Script reference; resolves against registered components
        script: String,
        /// Execution name (defaults to the script)
        #[arg(long)]
        name: Option<String>,
    },
    /// Start the external-control server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8173)]
        port: u16,
        /// Pre-shared bearer token required on HTTP requests
        #[arg(long)]
        token: Option<String>,
        /// Speak JSON-RPC on stdio instead of HTTP
        #[arg(long)]
        stdio: bool,
    },
    /// List recent executions
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one execution in detail
    Inspect {
        /// Execution id or unique prefix
        id: String,
    },
    /// Raw table access
    #[command(subcommand)]
    Db(commands::db::DbCommand),
    /// Show an execution's log file
    Logs {
        id: String,
        #[arg(long)]
        follow: bool,
        /// Filter lines by level substring (e.g. INFO, WARN)
        #[arg(long)]
        level: Option<String>,
    },
    /// Export an execution as a zip archive
    Export {
        id: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let db_path = env::db_path(cli.db);

    let result = match cli.command {
        Command::Run { script, name } => commands::run::run(&db_path, &script, name).await,
        Command::Serve { host, port, token, stdio } => {
            commands::serve::serve(&db_path, &host, port, token, stdio).await
        }
        Command::List { limit } => commands::list::list(&db_path, limit),
        Command::Inspect { id } => commands::inspect::inspect(&db_path, &id),
        Command::Db(command) => commands::db::run(&db_path, command),
        Command::Logs { id, follow, level } => {
            commands::logs::logs(&db_path, &id, follow, level.as_deref()).await
        }
        Command::Export { id, output } => commands::export::export(&db_path, &id, output),
    };

    if let Err(error) = result {
        eprintln!("error: {error}");
        std::process::exit(error.code);
    }
}
