// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `smithers logs <id>`

use crate::exit_error::ExitError;
use crate::logging;
use sm_store::{executions, Database};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

pub async fn logs(
    db_path: &Path,
    id: &str,
    follow: bool,
    level: Option<&str>,
) -> Result<(), ExitError> {
    let db = Database::open(db_path)?;
    let resolved = executions::resolve_prefix(&db, id)?;
    let log_path = logging::execution_log_path(db_path, &resolved);

    if !log_path.exists() {
        return Err(ExitError::failure(format!("no log file at {}", log_path.display())));
    }

    let file = std::fs::File::open(&log_path)?;
    let mut reader = BufReader::new(file);
    let mut offset = print_lines(&mut reader, level)?;

    while follow {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let file = std::fs::File::open(&log_path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;
        offset += print_lines(&mut reader, level)?;
    }

    Ok(())
}

/// Print matching lines; returns bytes consumed.
fn print_lines(
    reader: &mut impl BufRead,
    level: Option<&str>,
) -> Result<u64, ExitError> {
    let mut consumed = 0u64;
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        consumed += read as u64;
        let matches = level
            .map(|l| line.to_uppercase().contains(&l.to_uppercase()))
            .unwrap_or(true);
        if matches {
            print!("{line}");
        }
    }
    Ok(consumed)
}
