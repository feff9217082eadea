// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite connection wrapper
//!
//! A single connection guarded by a mutex. WAL journal mode, a 5 s busy
//! timeout, and foreign keys are set on open; the schema migrations run
//! before the handle is returned.

use crate::error::StoreError;
use crate::schema;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed-width ISO-8601 with timezone. All persisted timestamps use
/// this form so string comparison matches chronological order.
pub fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Epoch milliseconds to the persisted timestamp form.
pub fn iso_from_ms(epoch_ms: u64) -> String {
    let dt = DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64).unwrap_or_default();
    iso(dt)
}

pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        let db = Self { conn: Mutex::new(conn), path: Some(path.as_ref().to_path_buf()) };
        db.configure()?;
        schema::migrate(&db)?;
        Ok(db)
    }

    /// Open an in-memory database (tests and ephemeral runs).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Mutex::new(conn), path: None };
        db.configure()?;
        schema::migrate(&db)?;
        Ok(db)
    }

    fn configure(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a read or single-statement write against the connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    /// Run `f` inside one transaction; rolled back on error.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}
