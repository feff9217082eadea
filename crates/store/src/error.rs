// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error taxonomy

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A state value could not be canonicalized. The enclosing commit
    /// fails and the write queue is retained.
    #[error("cannot serialize value for key {key:?}: {message}")]
    Serialization { key: String, message: String },

    #[error("schema migration failed at version {version}: {message}")]
    Migration { version: i64, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("ambiguous id prefix {prefix:?} matches {count} rows")]
    AmbiguousPrefix { prefix: String, count: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export error: {0}")]
    Export(String),
}
