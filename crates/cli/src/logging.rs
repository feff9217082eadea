// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging bootstrap
//!
//! Console output honors `RUST_LOG`; `run` and `serve` additionally
//! append to a per-execution (or server) log file under the state dir,
//! which `logs <id>` reads back.

use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Directory for log files: `<db parent>/logs`.
pub fn log_dir(db_path: &Path) -> PathBuf {
    db_path.parent().unwrap_or(Path::new(".")).join("logs")
}

/// Log file for one execution.
pub fn execution_log_path(db_path: &Path, execution_id: &str) -> PathBuf {
    log_dir(db_path).join(format!("{execution_id}.log"))
}

/// Install the subscriber. Returns the appender guard; keep it alive
/// for the life of the process.
pub fn init(
    db_path: &Path,
    file_name: &str,
) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    let dir = log_dir(db_path);
    std::fs::create_dir_all(&dir)?;

    let appender = tracing_appender::rolling::never(&dir, format!("{file_name}.log"));
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}
