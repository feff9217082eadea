// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stdio transport: line-delimited JSON-RPC
//!
//! One request per line on stdin, one response per line on stdout.
//! Malformed lines get a parse-error response with a null id.

use crate::dispatch::dispatch;
use crate::state::ServerState;
use sm_rpc::{error_codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Serve JSON-RPC over stdio until stdin closes.
pub async fn serve_stdio(state: Arc<ServerState>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    serve_lines(state, stdin, stdout).await
}

/// Transport loop over arbitrary reader/writer pairs (testable).
pub async fn serve_lines(
    state: Arc<ServerState>,
    reader: impl tokio::io::AsyncRead + Unpin,
    mut writer: impl AsyncWrite + Unpin,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => dispatch(&state, request).await,
            Err(e) => Some(JsonRpcResponse::failure(
                None,
                JsonRpcError::new(error_codes::PARSE_ERROR, format!("parse error: {e}")),
            )),
        };

        if let Some(response) = response {
            let mut text = serde_json::to_string(&response).unwrap_or_default();
            text.push('\n');
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await?;
        }
    }

    tracing::info!("stdio transport closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;
    use sm_backend::FakeExecutor;
    use sm_engine::EngineConfig;
    use sm_store::Database;

    fn state() -> Arc<ServerState> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        ServerState::new(
            db,
            ComponentRegistry::new(),
            Arc::new(FakeExecutor::new()),
            EngineConfig::default(),
            None,
        )
    }

    async fn roundtrip(input: &str) -> Vec<serde_json::Value> {
        let mut output = Vec::new();
        serve_lines(state(), input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn responds_line_per_request() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"resources/list","params":{}}"#,
            "\n",
        );
        let responses = roundtrip(input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert!(responses[0]["result"]["session_id"].is_string());
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn malformed_line_is_a_parse_error() {
        let responses = roundtrip("this is not json\n").await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[0]["id"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn blank_lines_are_ignored() {
        let responses =
            roundtrip("\n\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n").await;
        assert_eq!(responses.len(), 1);
    }
}
