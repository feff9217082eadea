// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend error taxonomy

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Explicit rate limit, optionally with a retry-after hint.
    #[error("rate limited{}", retry_after_ms.map(|ms| format!(" (retry after {ms}ms)")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    /// The executor violated its stream contract (e.g. a second
    /// terminal result).
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}
