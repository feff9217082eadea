// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool parameter and result shapes
//!
//! Every mutating tool takes a validated parameter struct and returns a
//! typed summary. Validation failures map to invalid-params errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("missing required parameter {0:?}")]
    Missing(&'static str),

    #[error("invalid parameter {name:?}: {message}")]
    Invalid { name: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartExecutionParams {
    pub script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub config: Value,
}

impl StartExecutionParams {
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.script.trim().is_empty() {
            return Err(ToolError::Missing("script"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickParams {
    pub execution_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopParams {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStateParams {
    pub execution_id: String,
    pub key: String,
    /// Null deletes the key.
    #[serde(default)]
    pub value: Value,
    /// "durable" (default) or "volatile".
    #[serde(default)]
    pub tier: Option<String>,
}

impl SetStateParams {
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.key.is_empty() {
            return Err(ToolError::Missing("key"));
        }
        if let Some(tier) = &self.tier {
            if tier != "durable" && tier != "volatile" {
                return Err(ToolError::Invalid {
                    name: "tier",
                    message: format!("expected durable or volatile, got {tier:?}"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFrameParams {
    pub execution_id: String,
    pub sequence: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartFromFrameParams {
    pub execution_id: String,
    pub sequence: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelNodeParams {
    pub execution_id: String,
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryNodeParams {
    pub execution_id: String,
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveParams {
    pub approval_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenyParams {
    pub approval_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Typed summary every tool returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    pub tool: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ToolSummary {
    pub fn ok(tool: impl Into<String>) -> Self {
        Self { tool: tool.into(), ok: true, execution_id: None, detail: None }
    }

    pub fn with_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_execution_requires_script() {
        let params = StartExecutionParams {
            script: "  ".to_string(),
            name: None,
            execution_id: None,
            config: Value::Null,
        };
        assert_eq!(params.validate(), Err(ToolError::Missing("script")));
    }

    #[test]
    fn set_state_validates_tier() {
        let mut params = SetStateParams {
            execution_id: "e1".to_string(),
            key: "k".to_string(),
            value: json!(1),
            tier: Some("durable".to_string()),
        };
        assert!(params.validate().is_ok());

        params.tier = Some("bogus".to_string());
        assert!(matches!(params.validate(), Err(ToolError::Invalid { name: "tier", .. })));

        params.tier = None;
        params.key = String::new();
        assert_eq!(params.validate(), Err(ToolError::Missing("key")));
    }

    #[test]
    fn params_deserialize_from_json() {
        let params: SetStateParams = serde_json::from_value(json!({
            "execution_id": "e1",
            "key": "enabled",
            "value": true,
        }))
        .unwrap();
        assert_eq!(params.key, "enabled");
        assert_eq!(params.value, json!(true));
        assert!(params.tier.is_none());
    }

    #[test]
    fn summary_builder() {
        let summary = ToolSummary::ok("tick")
            .with_execution("e1")
            .with_detail(json!({"frames_run": 1}));
        let text = serde_json::to_value(&summary).unwrap();
        assert_eq!(text["tool"], "tick");
        assert_eq!(text["ok"], true);
        assert_eq!(text["detail"]["frames_run"], 1);
    }
}
