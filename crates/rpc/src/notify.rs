// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server → client notifications
//!
//! Engine events wrapped with a monotone stream id so a resumed SSE
//! connection can replay since `Last-Event-ID`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sm_core::EngineEvent;

/// One notification as sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn from_event(event: &EngineEvent) -> Self {
        Self {
            method: event.method().to_string(),
            params: serde_json::to_value(event).unwrap_or(Value::Null),
        }
    }
}

/// A notification with its position in the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEnvelope {
    /// Monotone id; clients resume with `Last-Event-ID`.
    pub id: u64,
    #[serde(flatten)]
    pub notification: Notification,
}

impl StreamEnvelope {
    pub fn new(id: u64, event: &EngineEvent) -> Self {
        Self { id, notification: Notification::from_event(event) }
    }

    /// Render as one SSE frame (`id:`/`event:`/`data:` lines).
    pub fn to_sse(&self) -> String {
        let data = serde_json::to_string(&self.notification.params).unwrap_or_default();
        format!("id: {}\nevent: {}\ndata: {}\n\n", self.id, self.notification.method, data)
    }
}

/// SSE comment line used as a keep-alive.
pub fn sse_keepalive() -> &'static str {
    ": keep-alive\n\n"
}
